mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use dav_client::dav::{
    self, Depth, Field, LockInfo, LockScope, LockToken, LockType, Owner, Prop, PropFind,
    PropertyUpdate, PropertyUpdateItem, Timeout,
};
use dav_client::{HyperTransport, Progress, Timeouts, WebDavClient};

use config::*;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(short, long, env = "DAVCTL_CONFIG", default_value = "davctl.toml")]
    /// Path to the davctl configuration file
    config_file: PathBuf,

    /// Overrides the password of the configuration file
    #[clap(long, env = "DAVCTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a collection (PROPFIND, depth 1)
    Ls {
        #[clap(default_value = "")]
        path: String,
    },
    /// Download a resource to a local file
    Get { path: String, output: PathBuf },
    /// Upload a local file
    Put {
        input: PathBuf,
        path: String,
        #[clap(long)]
        content_type: Option<String>,
        #[clap(long)]
        lock_token: Option<String>,
    },
    /// Create a collection
    Mkdir { path: String },
    /// Delete a resource or a whole collection
    Rm {
        path: String,
        #[clap(long)]
        lock_token: Option<String>,
    },
    /// Copy a resource, recursively unless --shallow
    Cp {
        source: String,
        destination: String,
        #[clap(long)]
        shallow: bool,
        #[clap(long)]
        no_overwrite: bool,
    },
    /// Move a resource
    Mv {
        source: String,
        destination: String,
        #[clap(long)]
        no_overwrite: bool,
        #[clap(long)]
        lock_token: Option<String>,
    },
    /// Take a write lock and print its token
    Lock {
        path: String,
        /// Lock duration in seconds, infinite when omitted
        #[clap(long)]
        timeout: Option<u32>,
        #[clap(long)]
        shared: bool,
        /// Only lock the resource, not its members
        #[clap(long)]
        shallow: bool,
        #[clap(long)]
        owner: Option<String>,
    },
    /// Release a lock
    Unlock { path: String, lock_token: String },
    /// Set or remove the display name of a resource
    Proppatch {
        path: String,
        #[clap(long, conflicts_with = "remove")]
        set: Option<String>,
        #[clap(long)]
        remove: bool,
        #[clap(long)]
        lock_token: Option<String>,
    },
}

fn tracer() {
    tracing_subscriber::fmt::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,davctl=info,dav_client=info")
    }

    // Abort on panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();
    let config = read_config(args.config_file.clone())
        .context(format!("unable to load {}", args.config_file.display()))?;
    let dav = build_client(&config, args.password.clone())?;

    match args.command {
        Command::Ls { path } => list(&dav, &path).await,
        Command::Get { path, output } => download(&dav, &path, output).await,
        Command::Put {
            input,
            path,
            content_type,
            lock_token,
        } => upload(&dav, input, &path, content_type, lock_token).await,
        Command::Mkdir { path } => {
            dav.mkcol(&path, None).await?;
            Ok(())
        }
        Command::Rm { path, lock_token } => {
            let token = lock_token.map(LockToken::new);
            dav.delete(&path, token.as_ref()).await?;
            Ok(())
        }
        Command::Cp {
            source,
            destination,
            shallow,
            no_overwrite,
        } => {
            let depth = if shallow { Depth::Zero } else { Depth::Infinity };
            dav.copy_to(&source, &destination, depth, Some(!no_overwrite))
                .await?;
            Ok(())
        }
        Command::Mv {
            source,
            destination,
            no_overwrite,
            lock_token,
        } => {
            let token = lock_token.map(LockToken::new);
            dav.move_to(&source, &destination, Some(!no_overwrite), token.as_ref())
                .await?;
            Ok(())
        }
        Command::Lock {
            path,
            timeout,
            shared,
            shallow,
            owner,
        } => {
            let timeout = match timeout {
                Some(secs) => Timeout::Seconds(secs),
                None => Timeout::Infinite,
            };
            let info = LockInfo {
                lockscope: if shared {
                    LockScope::Shared
                } else {
                    LockScope::Exclusive
                },
                locktype: LockType::Write,
                owner: owner.map(Owner::Txt),
            };
            let depth = if shallow { Depth::Zero } else { Depth::Infinity };
            let lock = dav
                .lock(&path, &Timeouts::from(timeout), depth, &info)
                .await?
                .body;
            println!("{}", lock.token.as_str());
            Ok(())
        }
        Command::Unlock { path, lock_token } => {
            dav.unlock(&path, Some(&LockToken::new(lock_token))).await?;
            Ok(())
        }
        Command::Proppatch {
            path,
            set,
            remove,
            lock_token,
        } => proppatch(&dav, &path, set, remove, lock_token).await,
    }
}

fn build_client(config: &Config, password: Option<String>) -> Result<WebDavClient> {
    let mut transport =
        HyperTransport::new().map_err(|e| anyhow::anyhow!("unable to set up TLS: {}", e))?;
    if let Some(username) = &config.server.username {
        let password = password
            .or_else(|| config.server.password.clone())
            .unwrap_or_default();
        transport = transport
            .with_basic_auth(username, &password)
            .map_err(|e| anyhow::anyhow!("invalid credentials: {}", e))?;
    }

    let client_config = dav_client::ClientConfig {
        base_url: Some(config.server.url.clone()),
        ..config.client.clone()
    };
    Ok(WebDavClient::new(Arc::new(transport), client_config))
}

/// Cancelled on the first Ctrl-C.
fn interruptible() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping the transfer");
            child.cancel();
        }
    });
    token
}

async fn list(dav: &WebDavClient, path: &str) -> Result<()> {
    let listing = dav.propfind(path, Depth::One, &PropFind::AllProp).await?;
    for resp in listing.body.responses.iter() {
        let Some(prop) = resp.ok_prop() else {
            tracing::warn!(href = resp.href(), "no readable property");
            continue;
        };
        let kind = if prop.is_collection() { 'd' } else { '-' };
        let size = prop.content_length().unwrap_or(0);
        let modified = prop
            .last_modified()
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!("{} {:>12} {:>16} {}", kind, size, modified, resp.href());
    }
    Ok(())
}

async fn download(dav: &WebDavClient, path: &str, output: PathBuf) -> Result<()> {
    let mut file = tokio::fs::File::create(&output)
        .await
        .context(format!("unable to create {}", output.display()))?;
    let cancel = interruptible();

    let done = dav
        .download(path, &mut file, &cancel, report("downloaded"))
        .await?;
    tracing::info!(bytes = done.body, file = %output.display(), "download complete");
    Ok(())
}

async fn upload(
    dav: &WebDavClient,
    input: PathBuf,
    path: &str,
    content_type: Option<String>,
    lock_token: Option<String>,
) -> Result<()> {
    let file = tokio::fs::File::open(&input)
        .await
        .context(format!("unable to open {}", input.display()))?;
    let token = lock_token.map(LockToken::new);
    let cancel = interruptible();

    let done = dav
        .upload(
            path,
            file,
            content_type.as_deref(),
            token.as_ref(),
            &cancel,
            report("uploaded"),
        )
        .await?;
    tracing::info!(bytes = done.body, status = %done.status, "upload complete");
    Ok(())
}

fn report(verb: &'static str) -> impl FnMut(Progress) + Send + 'static {
    move |p: Progress| match p.total {
        Some(total) => tracing::debug!("{} {}/{} bytes", verb, p.transferred, total),
        None => tracing::debug!("{} {} bytes", verb, p.transferred),
    }
}

async fn proppatch(
    dav: &WebDavClient,
    path: &str,
    set: Option<String>,
    remove: bool,
    lock_token: Option<String>,
) -> Result<()> {
    let item = match (set, remove) {
        (Some(name), false) => PropertyUpdateItem::Set(Prop {
            displayname: Some(Field::Value(name)),
            ..Prop::default()
        }),
        (None, true) => PropertyUpdateItem::Remove(Prop::from_names(&[
            dav::PropertyName::DisplayName,
        ])),
        _ => bail!("exactly one of --set or --remove is expected"),
    };
    let token = lock_token.map(LockToken::new);

    let resp = dav
        .proppatch(path, &PropertyUpdate(vec![item]), token.as_ref())
        .await?
        .ensure_success()?;
    tracing::info!(status = %resp.status, "properties updated");
    Ok(())
}
