//! `robolink watch`: run the full sync stack and print state changes.

use std::sync::Arc;
use std::time::Duration;

use robolink_core::{DeviceState, Lifecycle, Router, StateStream};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;
use crate::sink::ConsoleSink;

use super::{Session, util};

pub async fn handle(session: &Session, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let router = Router::from_config(
        &session.config,
        session.storage()?,
        Arc::new(ConsoleSink::new(color)),
    )?;
    if args.background {
        router.set_lifecycle(Lifecycle::Background);
    }

    let mut stream = router.stream();
    router.start().await?;
    let result = match emit(&stream.latest(), global, color) {
        Ok(()) => follow(&mut stream, args, global, color).await,
        Err(e) => Err(e),
    };

    router.shutdown().await;
    result
}

async fn follow(
    stream: &mut StateStream,
    args: &WatchArgs,
    global: &GlobalOpts,
    color: bool,
) -> Result<(), CliError> {
    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => return Ok(()),
            () = &mut deadline => return Ok(()),
            changed = stream.changed() => {
                let Some(state) = changed else { return Ok(()) };
                emit(&state, global, color)?;
            }
        }
    }
}

fn emit(state: &DeviceState, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let out = match global.output {
        OutputFormat::Table => util::summarize_state(state, color),
        // One document per line so the stream stays parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_single(OutputFormat::JsonCompact, state, |_| String::new())?
        }
        OutputFormat::Yaml => format!(
            "---\n{}",
            output::render_single(OutputFormat::Yaml, state, |_| String::new())?
        ),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
