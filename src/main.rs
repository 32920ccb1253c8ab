mod config;
mod data;
mod errors;
mod etl;

use std::env;
use std::io;
use std::path::Path;

use log::{error, info};
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::config::{load_user_config, Job, UserConfig, DEFAULT_CONFIG_PATH};
use crate::errors::Result;
use crate::etl::draw_map::DrawMapEtl;
use crate::etl::fetch_osm::FetchOsmEtl;
use crate::etl::parse_osm::ParseOsmEtl;
use crate::etl::Etl;

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn run_etl(etl: &mut impl Etl, dir: &Path, refresh: bool) -> Result<()> {
    if refresh {
        etl.refresh(dir)
    } else {
        etl.process(dir)
    }
}

fn run(user_config: &UserConfig) -> Result<()> {
    let job = Job::resolve(user_config)?;
    let work_dir = job.work_dir(user_config)?;

    if let Some(element) = job.download {
        let mut etl = FetchOsmEtl::new(element, &job.xml_path, user_config);
        run_etl(&mut etl, &work_dir, user_config.refresh)?;
    }

    if let Some(svg_path) = &job.svg_path {
        let mut parse_etl = ParseOsmEtl::new(&job.xml_path);
        run_etl(&mut parse_etl, &work_dir, user_config.refresh)?;

        let mut draw_etl = DrawMapEtl::new(svg_path, &user_config.style);
        run_etl(&mut draw_etl, &work_dir, user_config.refresh)?;
    }

    Ok(())
}

fn main() -> Result<()> {
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let user_config = load_user_config(Path::new(&config_path))?;
    setup_logging(&user_config.log_level);

    info!(config_path = config_path.as_str(); "Starting conversion");
    run(&user_config).map_err(|err| {
        error!(err = err.message.as_str(); "Conversion failed");
        err
    })
}
