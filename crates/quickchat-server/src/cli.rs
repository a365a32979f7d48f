use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "quickchat-server", about = "QuickChat messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quickchat.toml")]
    pub config: String,

    /// Path to directory containing built web UI files (overrides config)
    #[arg(long)]
    pub web_dir: Option<String>,
}
