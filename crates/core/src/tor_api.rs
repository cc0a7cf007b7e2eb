//! Binding to Tor's embedding API (`tor_api.h`).

use std::ffi::{c_char, c_int};
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::{
    arguments::StartupArguments,
    daemon_library::DaemonLibrary,
    error::{LaunchError, Result},
};

#[repr(C)]
struct RawConfiguration {
    _private: [u8; 0],
}

unsafe extern "C" {
    fn tor_main_configuration_new() -> *mut RawConfiguration;
    fn tor_main_configuration_set_command_line(
        cfg: *mut RawConfiguration,
        argc: c_int,
        argv: *mut *mut c_char,
    ) -> c_int;
    fn tor_main_configuration_free(cfg: *mut RawConfiguration);
    fn tor_run_main(cfg: *const RawConfiguration) -> c_int;
}

/// A `tor_main_configuration_t` together with the argv storage it points into.
pub struct TorConfiguration {
    raw: NonNull<RawConfiguration>,
    argv: Vec<*mut c_char>,
    arguments: Option<StartupArguments>,
}

impl Drop for TorConfiguration {
    fn drop(&mut self) {
        // Tor keeps pointers into argv, so free the handle before the fields.
        unsafe { tor_main_configuration_free(self.raw.as_ptr()) };
        debug!(
            argc = self.argv.len().saturating_sub(1),
            program = ?self.arguments.as_ref().and_then(StartupArguments::program_name),
            "released tor configuration"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TorLibrary;

impl DaemonLibrary for TorLibrary {
    type Configuration = TorConfiguration;

    fn create_configuration(&self) -> Result<TorConfiguration> {
        let raw = unsafe { tor_main_configuration_new() };
        let raw = NonNull::new(raw).ok_or(LaunchError::ConfigurationUnavailable)?;
        Ok(TorConfiguration {
            raw,
            argv: Vec::new(),
            arguments: None,
        })
    }

    fn set_command_line(
        &self,
        configuration: &mut TorConfiguration,
        arguments: StartupArguments,
    ) -> Result<()> {
        let argc = c_int::try_from(arguments.len()).map_err(|error| {
            LaunchError::InvalidArgument {
                index: arguments.len(),
                reason: error.to_string(),
            }
        })?;

        // CString buffers live on the heap, so these pointers stay valid
        // when `arguments` moves into the configuration below.
        let mut argv: Vec<*mut c_char> = arguments
            .iter()
            .map(|argument| argument.as_ptr() as *mut c_char)
            .collect();
        argv.push(ptr::null_mut());

        let code = unsafe {
            tor_main_configuration_set_command_line(
                configuration.raw.as_ptr(),
                argc,
                argv.as_mut_ptr(),
            )
        };

        configuration.argv = argv;
        configuration.arguments = Some(arguments);

        if code != 0 {
            return Err(LaunchError::CommandLineRejected { code }.into());
        }
        Ok(())
    }

    fn run_main(&self, configuration: &TorConfiguration) -> i32 {
        unsafe { tor_run_main(configuration.raw.as_ptr()) }
    }

    fn release_configuration(&self, configuration: TorConfiguration) {
        drop(configuration);
    }
}
