pub mod classifier;
pub mod lifecycle;
pub mod logging;
pub mod mailer;
pub mod storage;
pub mod web;
