use std::ffi::{CStr, CString};

use crate::error::LaunchError;

/// Owned, NUL-terminated copy of a daemon command line.
///
/// The first entry is conventionally the program name. The copy is taken when
/// a launch is requested and then handed to the daemon configuration, which
/// keeps it alive until the configuration itself is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupArguments {
    arguments: Vec<CString>,
}

impl StartupArguments {
    /// Deep-copies `arguments`. The caller keeps ownership of its originals.
    pub fn copy_from<S: AsRef<str>>(arguments: &[S]) -> Result<Self, LaunchError> {
        if arguments.is_empty() {
            return Err(LaunchError::EmptyArguments);
        }

        let arguments = arguments
            .iter()
            .enumerate()
            .map(|(index, argument)| {
                CString::new(argument.as_ref()).map_err(|error| LaunchError::InvalidArgument {
                    index,
                    reason: error.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { arguments })
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn program_name(&self) -> Option<&CStr> {
        self.arguments.first().map(CString::as_c_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.arguments.iter().map(CString::as_c_str)
    }

    /// Lossy UTF-8 rendering, for logs and tests.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|argument| argument.to_string_lossy().into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_every_argument_in_order() {
        let arguments = StartupArguments::copy_from(&["tor", "SocksPort", "9050"]).unwrap();

        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments.program_name().unwrap().to_str().unwrap(), "tor");
        assert_eq!(arguments.to_strings(), vec!["tor", "SocksPort", "9050"]);
    }

    #[test]
    fn copy_is_independent_of_the_source() {
        let mut source = vec![String::from("tor"), String::from("--flag")];
        let arguments = StartupArguments::copy_from(&source).unwrap();

        source[1].push_str("-changed");
        drop(source);

        assert_eq!(arguments.to_strings(), vec!["tor", "--flag"]);
    }

    #[test]
    fn rejects_empty_command_line() {
        let empty: [&str; 0] = [];
        let error = StartupArguments::copy_from(&empty).unwrap_err();
        assert!(matches!(error, LaunchError::EmptyArguments));
    }

    #[test]
    fn rejects_interior_nul() {
        let error = StartupArguments::copy_from(&["tor", "Log", "bad\0value"]).unwrap_err();
        match error {
            LaunchError::InvalidArgument { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
