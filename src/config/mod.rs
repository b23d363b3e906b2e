pub mod settings;

pub use settings::{load_settings, load_user_settings, resolve_config_path, PrefetchSettings};
