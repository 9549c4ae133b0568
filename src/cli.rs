use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lofi-archive")]
#[command(version)]
#[command(about = "Serve entries of zip attachments over HTTP", long_about = None)]
#[command(after_help = "Examples:\n  \
  lofi-archive serve --store /srv/attachments           serve a local attachment tree\n  \
  lofi-archive serve --store https://wiki.example.com   proxy a remote attachment store\n  \
  lofi-archive cat project.zip pages/0.png > page.png   pipe one entry to stdout")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP resolver
    Serve(ServeArgs),
    /// Write one entry of a local archive to stdout
    Cat(CatArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "LOFI_LISTEN", default_value = "127.0.0.1:8078")]
    pub listen: SocketAddr,

    /// Attachment store: a directory or an http(s) URL
    #[arg(long, env = "LOFI_STORE", value_name = "DIR|URL")]
    pub store: String,

    /// Read token for a local store, service token for an HTTP store
    #[arg(long, env = "LOFI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl ServeArgs {
    pub fn is_http_store(&self) -> bool {
        self.store.starts_with("http://") || self.store.starts_with("https://")
    }
}

#[derive(Args, Debug)]
pub struct CatArgs {
    /// Zip archive on the local filesystem
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Entry name inside the archive, e.g. pages/0.png
    #[arg(value_name = "INNER_PATH")]
    pub inner_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve(args: &[&str]) -> ServeArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Serve(serve) => serve,
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn serve_defaults() {
        let args = serve(&["lofi-archive", "serve", "--store", "/srv/attachments"]);
        assert_eq!(args.listen, "127.0.0.1:8078".parse().unwrap());
        assert!(!args.is_http_store());
    }

    #[test]
    fn detects_http_store() {
        let args = serve(&[
            "lofi-archive",
            "serve",
            "--store",
            "https://wiki.example.com",
            "--listen",
            "0.0.0.0:9000",
        ]);
        assert!(args.is_http_store());
        assert_eq!(args.listen.port(), 9000);
    }

    #[test]
    fn verbosity_is_global() {
        let cli = Cli::try_parse_from(["lofi-archive", "cat", "a.zip", "pages/0.png", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Cat(cat) => {
                assert_eq!(cat.archive, PathBuf::from("a.zip"));
                assert_eq!(cat.inner_path, "pages/0.png");
            }
            other => panic!("expected cat, got {other:?}"),
        }
    }

    #[test]
    fn cat_needs_both_arguments() {
        assert!(Cli::try_parse_from(["lofi-archive", "cat", "a.zip"]).is_err());
    }
}
