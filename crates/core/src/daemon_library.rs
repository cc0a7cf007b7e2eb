use crate::{arguments::StartupArguments, error::Result};

/// The embedded daemon's startup API.
///
/// Implementations wrap a library whose main entry point blocks for the
/// daemon's whole lifetime. The launcher drives one configuration through
/// create, set_command_line, run_main and release_configuration, in that
/// order, on its worker thread.
pub trait DaemonLibrary: Send + Sync + 'static {
    type Configuration;

    fn create_configuration(&self) -> Result<Self::Configuration>;

    /// Installs the command line. The configuration takes ownership of the
    /// arguments and must keep them alive until it is released.
    fn set_command_line(
        &self,
        configuration: &mut Self::Configuration,
        arguments: StartupArguments,
    ) -> Result<()>;

    /// Blocks until the daemon shuts down and returns its exit code.
    fn run_main(&self, configuration: &Self::Configuration) -> i32;

    fn release_configuration(&self, configuration: Self::Configuration);
}
