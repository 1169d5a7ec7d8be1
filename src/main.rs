// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

#![allow(clippy::module_name_repetitions)]

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    select,
    signal::{
        ctrl_c,
        unix::{signal, SignalKind},
    },
    sync::watch,
};

mod auth;
mod decode;
mod error;
mod metadata;
mod peer;
mod recorder;
mod rooms;
mod session;
mod settings;
mod track;
mod ws;

use crate::{
    auth::RoleAuthorizer,
    metadata::MemoryMetadataStore,
    recorder::Recorder,
    rooms::{spawn_keepalive, RoomHub},
    settings::Settings,
};

fn check_for_ffmpeg() -> Result<()> {
    _ = std::process::Command::new("ffmpeg")
        .args(["--help"])
        .output()?;

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    if check_for_ffmpeg().is_err() {
        warn!("ffmpeg is not present on the system. Recording will not work.");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio async runtime")?;

    runtime.spawn(async move {
        let mut sig_term = signal(SignalKind::terminate()).expect("can not setup SIGTERM handler");
        select! {
            _ = ctrl_c() => { info!("received Ctrl-C"); }
            _ = sig_term.recv() => { info!("received SIGTERM"); }
        }
        shutdown_tx
            .send(true)
            .expect("failed to send shutdown signal");
    });

    if let Err(e) = runtime.block_on(main2(shutdown_rx)) {
        eprintln!("Exit on failure: {e:?}");
        std::process::exit(-1);
    }

    Ok(())
}

async fn main2(mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let settings = Arc::new(Settings::load("config.toml").context("Failed to read config")?);

    // the demo collaborators; a deployment wires its own
    let authorizer = Arc::new(RoleAuthorizer);
    let metadata = Arc::new(MemoryMetadataStore::new());

    let recorder = Arc::new(Recorder::new(
        Arc::clone(&settings),
        authorizer,
        metadata,
    )?);
    info!(
        "recordings go to {:?}, {} open sessions",
        settings.recording.directory,
        recorder.session_count()
    );

    let hub = Arc::new(RoomHub::new());
    let keepalive = spawn_keepalive(
        Arc::clone(&hub),
        settings.timeouts.ping(),
        shutdown_rx.clone(),
    );

    let listener = TcpListener::bind(settings.signaling.listen)
        .await
        .with_context(|| format!("failed to listen on {}", settings.signaling.listen))?;

    select! {
        result = ws::serve(listener, hub, shutdown_rx.clone()) => {
            result.context("signaling endpoint failed")?;
        }
        result = shutdown_rx.changed() => {
            result?;
        }
    }

    // let running recordings flush and finalize before the runtime goes
    // away, a SIGTERM must not leave truncated files behind
    let open = recorder.session_count();
    if open > 0 {
        info!("waiting for {open} remaining recording session(s) to finish");
    }
    recorder.shutdown().await;

    keepalive.abort();
    info!("shut down");

    Ok(())
}
