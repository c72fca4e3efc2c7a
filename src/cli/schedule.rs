//! Run the schedules of a config file until interrupted

use std::path::PathBuf;

use crossbeam::channel;
use tracing::info;

use crate::{
    config::Config,
    host::with_params,
    scheduler::Scheduler,
    value::Value,
};

use super::CliError;

#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    pub config: PathBuf,
    pub params: Vec<(String, Value)>,
}

/// Starts every schedule in the config and blocks until Ctrl-C.
pub fn execute_schedule(options: &ScheduleOptions) -> Result<(), CliError> {
    let config = Config::load(&options.config)?;
    let scheduler = Scheduler::new(config);

    let (interrupt, interrupted) = channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = interrupt.try_send(());
    })?;

    scheduler.start(vec![with_params(options.params.clone())])?;
    info!(
        config = %options.config.display(),
        schedules = scheduler.config().schedules.len(),
        "waiting for Ctrl-C"
    );
    let _ = interrupted.recv();

    scheduler.stop();
    Ok(())
}
