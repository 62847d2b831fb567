mod page_session;
mod popup;
mod settings;
