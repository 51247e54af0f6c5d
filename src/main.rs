use clap::{Parser, Subcommand, ValueEnum};
use fluent_browser::assertion::ErrorHandler;
use fluent_browser::http::DirectoryKernel;
use fluent_browser::{Browser, Config, Driver};
use serde_json::json;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fluent-browser", version, about = "Drive a page and check what it shows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a page, run the given checks and print a summary
    Visit {
        url: String,

        #[arg(long, value_enum, default_value_t = Backend::Kernel)]
        backend: Backend,

        /// Directory served by the kernel backend
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Text the page must show; repeatable
        #[arg(long = "see")]
        see: Vec<String>,

        /// Write the page source here after the checks
        #[arg(long)]
        dump_dir: Option<PathBuf>,
    },
    /// Print the configuration the environment resolves to
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Kernel,
    Chrome,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Visit {
            url,
            backend,
            root,
            see,
            dump_dir,
        } => match backend {
            Backend::Kernel => {
                let browser = Browser::kernel_with_config(DirectoryKernel::new(root), config)
                    .with_handler(Rc::new(ErrorHandler));
                run(&browser, &url, &see, dump_dir)?;
                info!(status = browser.status_code()?, "kernel response");
            }
            Backend::Chrome => chrome(config, &url, &see, dump_dir)?,
        },
    }
    Ok(())
}

#[cfg(feature = "chrome")]
fn chrome(config: Config, url: &str, see: &[String], dump_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let browser = fluent_browser::Browser::chrome(config)?.with_handler(Rc::new(ErrorHandler));
    run(&browser, url, see, dump_dir)
}

#[cfg(not(feature = "chrome"))]
fn chrome(_config: Config, _url: &str, _see: &[String], _dump_dir: Option<PathBuf>) -> anyhow::Result<()> {
    anyhow::bail!("built without the `chrome` feature")
}

fn run<D: Driver>(
    browser: &Browser<D>,
    url: &str,
    see: &[String],
    dump_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    browser.visit(url)?;
    for text in see {
        browser.assert_see(text)?;
    }

    if let Some(dir) = dump_dir {
        let name = fluent_browser::testing::normalize_test_name(url);
        browser.save_source(dir.join(format!("{}.txt", name.trim_matches('-'))))?;
    }

    let summary = json!({
        "backend": browser.driver().backend(),
        "url": browser.current_url()?.as_str(),
        "title": browser.title()?,
        "links": browser.find("css~>a[href]")?.count(),
        "forms": browser.find("css~>form")?.count(),
        "checks": see.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
