pub mod twiml;
pub mod webhook;
