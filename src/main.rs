use clap::Parser;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use webdis::acl::Acl;
use webdis::config::Config;
use webdis::handler;
use webdis::pipeline::Gateway;
use webdis::upstream::Upstream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(default_value = "webdis.json")]
    config: String,
}

/// Not `#[tokio::main]`: `daemonize` must fork before any tokio runtime
/// (and its reactor threads) exist, so the runtime is built by hand after
/// the fork decision is made.
fn main() {
    let args = Args::parse();

    let config = match Config::new(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    if config.daemonize {
        let mut daemon = daemonize::Daemonize::new();
        if let Some(pidfile) = &config.pidfile {
            daemon = daemon.pid_file(pidfile);
        }
        if let Err(e) = daemon.start() {
            eprintln!("failed to daemonize: {e}");
            process::exit(1);
        }
    }

    init_tracing(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            process::exit(1);
        }
    };

    runtime.block_on(async_main(config));
}

/// Verbosity maps to a level filter; `logfile` adds a second, file-backed
/// sink alongside stdout rather than replacing it.
fn init_tracing(config: &Config) {
    let level = match config.verbosity.unwrap_or(1) {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    match &config.logfile {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "webdis.log".to_string());
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            std::mem::forget(guard);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking.and(std::io::stdout))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn async_main(config: Config) {
    info!("starting webdis");

    let upstream = match Upstream::new(&config) {
        Ok(u) => Arc::new(u),
        Err(e) => {
            error!("failed to initialize redis upstream: {e}");
            process::exit(1);
        }
    };
    upstream.spawn_reconnect_monitor();

    let acl = Acl::new(config.acl.clone());
    let max_body_bytes = config.http_max_request_size.unwrap_or(64 * 1024 * 1024);
    let gateway = Arc::new(Gateway {
        upstream,
        acl,
        max_body_bytes,
    });

    let app = axum::Router::new()
        .route(
            "/{*rest}",
            axum::routing::get(handler::handle)
                .post(handler::handle)
                .put(handler::handle)
                .options(handler::handle_options),
        )
        .route(
            "/",
            axum::routing::get(handler::handle)
                .post(handler::handle)
                .put(handler::handle)
                .options(handler::handle_options),
        )
        .with_state(gateway);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = match tokio::net::TcpListener::bind((config.http_host.as_str(), config.http_port))
        .await
    {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            process::exit(1);
        }
    };

    drop_privileges(&config);

    info!("listening on {addr}");
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        error!("server error: {e}");
        process::exit(1);
    }
}

/// Post-bind privilege drop, grounded on `server.c`'s setgid-before-setuid
/// ordering (dropping uid first would remove the permission needed to
/// change gid afterward).
fn drop_privileges(config: &Config) {
    if let Some(group) = &config.group {
        match nix::unistd::Group::from_name(group) {
            Ok(Some(g)) => {
                if let Err(e) = nix::unistd::setgid(g.gid) {
                    error!("failed to setgid to {group}: {e}");
                    process::exit(1);
                }
            }
            Ok(None) => {
                error!("unknown group: {group}");
                process::exit(1);
            }
            Err(e) => {
                error!("failed to look up group {group}: {e}");
                process::exit(1);
            }
        }
    }

    if let Some(user) = &config.user {
        match nix::unistd::User::from_name(user) {
            Ok(Some(u)) => {
                if let Err(e) = nix::unistd::setuid(u.uid) {
                    error!("failed to setuid to {user}: {e}");
                    process::exit(1);
                }
            }
            Ok(None) => {
                error!("unknown user: {user}");
                process::exit(1);
            }
            Err(e) => {
                error!("failed to look up user {user}: {e}");
                process::exit(1);
            }
        }
    }
}
