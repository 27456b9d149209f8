pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, default_settings_path, load_settings, load_settings_from_str,
    validate_settings,
};
pub use schema::{AuthConfig, DevToken, Settings, MAX_DPI, MIN_DPI};
