use torthread_core::error::Result;

use crate::LaunchArgs;

pub fn print_arguments(launch: LaunchArgs) -> Result<()> {
    let arguments = launch.resolve()?.to_arguments();
    let rendered = serde_json::to_string_pretty(&arguments).map_err(std::io::Error::other)?;
    println!("{rendered}");
    Ok(())
}
