#[cfg(test)]
use crate::core::app::{App, SessionContext};
#[cfg(test)]
use crate::core::config::Config;

#[cfg(test)]
pub fn create_test_app() -> App {
    App::new(SessionContext::new(
        Config::default(),
        Some("test-model".to_string()),
        false,
    ))
}

#[cfg(test)]
pub fn create_image_test_app() -> App {
    App::new(SessionContext::new(
        Config::default(),
        Some("test-model".to_string()),
        true,
    ))
}
