use std::{path::Path, time::Duration};

use torthread_core::{error::Result, wait_for_control_port};

pub async fn print_control_port(file: &Path, timeout: u64) -> Result<()> {
    let address = wait_for_control_port(file, Duration::from_secs(timeout)).await?;
    println!("{address}");
    Ok(())
}
