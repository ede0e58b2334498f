//! GUI child process. Spawned by the plugin side with its transport endpoint
//! on the command line; not meant to be launched by hand.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ripieno_channel::Endpoint;
use ripieno_gui::app::{ExitReason, GuiApp};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ripieno-gui", version, about = "Skinnable plugin GUI process")]
struct Cli {
    /// Path to the skin directory
    #[arg(long, value_name = "path")]
    skin: PathBuf,

    /// QML import path (repeatable)
    #[arg(long = "qml-import", value_name = "path")]
    qml_import: Vec<PathBuf>,

    /// Inherited socket descriptor
    #[cfg(unix)]
    #[arg(long, value_name = "fd")]
    socket: i32,

    /// Name of the plugin→GUI pipe
    #[cfg(windows)]
    #[arg(long = "pipe-in", value_name = "name")]
    pipe_in: String,

    /// Name of the GUI→plugin pipe
    #[cfg(windows)]
    #[arg(long = "pipe-out", value_name = "name")]
    pipe_out: String,
}

#[cfg(unix)]
fn open_endpoint(cli: &Cli) -> std::io::Result<Endpoint> {
    use std::os::unix::io::FromRawFd;
    use std::os::unix::net::UnixStream;

    // Safety: the parent placed this descriptor on the advertised slot
    // before exec and nothing else in this process owns it.
    let stream = unsafe { UnixStream::from_raw_fd(cli.socket) };
    Endpoint::from_stream(stream)
}

#[cfg(windows)]
fn open_endpoint(cli: &Cli) -> std::io::Result<Endpoint> {
    use std::fs::OpenOptions;
    use std::os::windows::io::AsRawHandle;

    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Pipes::{SetNamedPipeHandleState, PIPE_NOWAIT};

    let input = OpenOptions::new().read(true).open(&cli.pipe_in)?;
    let output = OpenOptions::new().write(true).open(&cli.pipe_out)?;

    for pipe in [&input, &output] {
        unsafe {
            SetNamedPipeHandleState(
                HANDLE(pipe.as_raw_handle() as _),
                Some(&PIPE_NOWAIT),
                None,
                None,
            )
            .map_err(|e| std::io::Error::other(e))?;
        }
    }

    Endpoint::from_pipes(input, output)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    info!(skin = %cli.skin.display(), "GUI process starting");

    let endpoint = match open_endpoint(&cli) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!(error = %e, "failed to open channel endpoint");
            return ExitCode::from(2);
        }
    };

    let app = GuiApp::new(endpoint, cli.skin, cli.qml_import);
    match app.run() {
        ExitReason::Destroyed => ExitCode::SUCCESS,
        ExitReason::ChannelLost => ExitCode::from(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_cli_parses_spawn_surface() {
        let cli = Cli::parse_from([
            "ripieno-gui",
            "--skin",
            "/opt/skins/default",
            "--qml-import",
            "/opt/qml",
            "--qml-import",
            "/opt/qml-extra",
            "--socket",
            "3",
        ]);

        assert_eq!(cli.skin, PathBuf::from("/opt/skins/default"));
        assert_eq!(cli.qml_import.len(), 2);
        assert_eq!(cli.socket, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_cli_requires_skin_and_socket() {
        assert!(Cli::try_parse_from(["ripieno-gui", "--socket", "3"]).is_err());
        assert!(Cli::try_parse_from(["ripieno-gui", "--skin", "/s"]).is_err());
    }
}
