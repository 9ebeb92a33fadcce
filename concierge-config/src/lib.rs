pub mod loader;
pub mod model;
pub mod presets;

pub use loader::{apply_overrides, get_env_overrides, load_config, merge_overrides};
pub use model::{ConciergeConfig, ConfigOverrides, SnapConfig, Status};
