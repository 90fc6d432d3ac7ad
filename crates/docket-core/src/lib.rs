pub mod actions;
pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod kanban;
pub mod list_view;
pub mod mock;
pub mod mutations;
pub mod notify;
pub mod optimistic;
pub mod permission;
pub mod render;
pub mod status_filter;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  Instrument,
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting docket CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.docketrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::Renderer::new(&cfg)?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let invocation = uuid::Uuid::new_v4();
  let span = tracing::info_span!(
    "invocation",
    id = %invocation
  );

  let acting_as = cli.acting_as.as_deref();
  // -q sends notifications to the log
  // instead of the terminal
  let served = if cli.quiet > 0 {
    runtime.block_on(
      serve(
        store,
        &cfg,
        &renderer,
        &notify::TracingNotifier,
        acting_as,
        cli.command
      )
      .instrument(span)
    )
  } else {
    let notifier =
      notify::ConsoleNotifier::new(
        renderer.color()
      );
    runtime.block_on(
      serve(
        store,
        &cfg,
        &renderer,
        &notifier,
        acting_as,
        cli.command
      )
      .instrument(span)
    )
  };
  served?;

  info!("done");
  Ok(())
}

async fn serve<N: notify::Notifier>(
  store: datastore::DataStore,
  cfg: &config::Config,
  renderer: &render::Renderer,
  notifier: &N,
  acting_as: Option<&str>,
  command: cli::Command
) -> anyhow::Result<()> {
  let current_user = match acting_as {
    | Some(id) => id.to_string(),
    | None => cfg.actor()?.id
  };
  let api = mock::MockTaskApi::open(store)?
    .with_current_user(current_user);
  let session = commands::Session::new(
    &api, notifier, cfg, renderer, acting_as
  )?;
  commands::dispatch(&session, command).await
}
