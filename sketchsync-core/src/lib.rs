pub mod config;
pub mod logging;
pub mod metrics;
pub mod scene_store;
pub mod tracing;

#[doc(hidden)]
pub mod test_utils;

pub use config::Config;
pub use logging::{init_logging, LogLevel};
pub use scene_store::{
    ChangeNotification, Element, ElementId, ElementKind, HistoryOutcome, Payload, RecordMode, Scene,
    StoreError, StoreResult,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let scene = Scene::with_config(&Config::default());
        assert!(scene.is_empty().unwrap());
    }
}
