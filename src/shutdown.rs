// Sounding Rocket Program
//
// The OS shutdown command, invoked once on the arm-switch-off transition out
// of LANDED. Out of scope per the specification beyond this one call site.

use std::io;
use std::process::Command;

use crate::error::Error;

/// Issue `sudo shutdown -h now`. Only called in non-dry-run mode.
pub fn issue_os_shutdown() -> Result<(), Error> {
    let status = Command::new("sudo")
        .args(["shutdown", "-h", "now"])
        .status()?;
    if !status.success() {
        return Err(Error::Io(io::Error::other(format!(
            "shutdown command exited with status {}",
            status
        ))));
    }
    Ok(())
}
