// Lifecycle actions (install/uninstall/reinstall/rebuild, setup-non-root)
pub mod lifecycle;

// Read-only status report
pub mod status;
