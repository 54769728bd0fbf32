#[macro_use] extern crate log;

use std::io;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use argparse::{ArgumentParser, StoreOption};
use env_logger::Env;

use selector_http::{Config, Dispatch, Listener, WorkerPool};


fn run(config: Config) -> io::Result<()> {
    let dispatch = Arc::new(Dispatch::new(config.context()));
    let pool = WorkerPool::new(config.min_workers, config.max_workers,
        config.clients_per_worker, config.limits(), dispatch)?;
    let mut listener = Listener::bind(("0.0.0.0", config.port), pool)?;
    listener.run();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let mut config_path: Option<PathBuf> = None;
    let mut port: Option<u16> = None;
    {
        let mut ap = ArgumentParser::new();
        ap.set_description("
            Serves static files over HTTP/1.x using a self-scaling
            pool of mio workers
        ");
        ap.refer(&mut config_path)
            .add_option(&["-c", "--config"], StoreOption,
                "TOML configuration file");
        ap.refer(&mut port)
            .add_option(&["-p", "--port"], StoreOption,
                "Port to listen on, overrides the configuration file");
        ap.parse_args_or_exit();
    }

    let mut config = match config_path {
        Some(ref path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(port) = port {
        config.port = port;
    }
    if let Err(e) = run(config) {
        error!("Can't start server: {}", e);
        exit(1);
    }
}
