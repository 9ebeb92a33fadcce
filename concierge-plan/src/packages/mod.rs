pub mod snap_package;
pub mod system_package;

pub use snap_package::SnapPackageHandler;
pub use system_package::SystemPackageHandler;
