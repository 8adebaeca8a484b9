//! `richclip` command line.
//!
//! ```bash
//! # Copy rich and plain renderings of the same content
//! richclip copy --html '<a href="https://example.com">link</a>' --plain 'link (https://example.com)'
//! ```

use clap::{Parser, Subcommand};

use richclip::SERVE_SUBCOMMAND;

#[derive(Debug, Parser)]
#[command(name = "richclip", version, about = "Copy HTML and plain text to the clipboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy an HTML fragment together with its plain-text rendering
    Copy {
        /// Served as text/html
        #[arg(long)]
        html: String,
        /// Served as text/plain, UTF8_STRING and STRING
        #[arg(long)]
        plain: String,
    },
    /// Own the clipboard with a payload read from stdin (internal)
    #[command(name = SERVE_SUBCOMMAND, hide = true)]
    Serve,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Copy { html, plain } => {
            richclip::write_multi_format(&html, &plain)?;
            println!("Copied to clipboard");
        }
        Command::Serve => {
            let stdin = std::io::stdin();
            if let Err(e) = richclip::serve_from_reader(stdin.lock()) {
                log::error!("Clipboard owner stopped: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}
