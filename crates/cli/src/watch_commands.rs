use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    clap::Args,
    rally_config::{RealtimeConfig, Severity, validate},
    rally_realtime::{
        ChannelKind, ChannelSubscription, DeliveredEvent, EventCallback, EventKind,
        RealtimeContext, SubscribeParams, Topic,
    },
    rally_transport_ws::WsTransportFactory,
    tokio::{sync::watch, task::JoinHandle},
    tracing::{info, warn},
};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Channel kind: dm or group.
    #[arg(long)]
    pub kind: ChannelKind,
    /// Thread id (dm) or channel id (group).
    #[arg(long)]
    pub channel: String,
    /// Comma-separated event kinds; all five when omitted.
    #[arg(long, value_delimiter = ',')]
    pub events: Vec<EventKind>,
}

/// A running subscription of any event kind.
trait ActiveWatch: Send {
    fn watch_connected(&self) -> watch::Receiver<bool>;
}

impl<T: Topic> ActiveWatch for ChannelSubscription<T> {
    fn watch_connected(&self) -> watch::Receiver<bool> {
        ChannelSubscription::watch_connected(self)
    }
}

fn open<T: Topic>(
    mut subscription: ChannelSubscription<T>,
    channel: &str,
    callback: EventCallback,
) -> Box<dyn ActiveWatch> {
    subscription.update(SubscribeParams::channel(channel).on_event(callback));
    Box::new(subscription)
}

fn subscribe(
    ctx: &RealtimeContext,
    kind: ChannelKind,
    event: EventKind,
    channel: &str,
    callback: EventCallback,
) -> Box<dyn ActiveWatch> {
    use rally_realtime as rt;

    match (kind, event) {
        (ChannelKind::Dm, EventKind::MessageAdded) => open(rt::dm_message_added(ctx), channel, callback),
        (ChannelKind::Dm, EventKind::MessageUpdated) => {
            open(rt::dm_message_updated(ctx), channel, callback)
        },
        (ChannelKind::Dm, EventKind::MessageDeleted) => {
            open(rt::dm_message_deleted(ctx), channel, callback)
        },
        (ChannelKind::Dm, EventKind::Typing) => open(rt::dm_typing(ctx), channel, callback),
        (ChannelKind::Dm, EventKind::ReactionAdded) => {
            open(rt::dm_reaction_added(ctx), channel, callback)
        },
        (ChannelKind::Group, EventKind::MessageAdded) => {
            open(rt::group_message_added(ctx), channel, callback)
        },
        (ChannelKind::Group, EventKind::MessageUpdated) => {
            open(rt::group_message_updated(ctx), channel, callback)
        },
        (ChannelKind::Group, EventKind::MessageDeleted) => {
            open(rt::group_message_deleted(ctx), channel, callback)
        },
        (ChannelKind::Group, EventKind::Typing) => open(rt::group_typing(ctx), channel, callback),
        (ChannelKind::Group, EventKind::ReactionAdded) => {
            open(rt::group_reaction_added(ctx), channel, callback)
        },
    }
}

/// Write one event as a JSON line on stdout.
fn print_event(event: DeliveredEvent) {
    match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to encode event"),
    }
}

fn log_transitions(event: EventKind, mut rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let connected = *rx.borrow_and_update();
            info!(event = %event, connected, "connection state changed");
        }
    })
}

/// Reject configs the transport cannot use; print warnings.
fn ensure_usable(config: &RealtimeConfig) -> Result<()> {
    let mut errors = Vec::new();
    for d in validate(config) {
        match d.severity {
            Severity::Error => errors.push(d.to_string()),
            Severity::Warning => warn!(path = d.path, "{}", d.message),
        }
    }
    if !errors.is_empty() {
        bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(())
}

pub async fn handle_watch(args: WatchArgs, config_path: Option<&Path>) -> Result<()> {
    if args.channel.is_empty() {
        bail!("--channel must not be empty");
    }
    let config = crate::load_effective_config(config_path)?;
    ensure_usable(&config)?;

    let factory = WsTransportFactory::from_config(&config.transport)
        .context("invalid transport endpoint")?;
    let ctx = RealtimeContext::from_config(&config, Arc::new(factory));

    let requested = if args.events.is_empty() {
        EventKind::ALL.to_vec()
    } else {
        args.events
    };
    let mut events = Vec::with_capacity(requested.len());
    for event in requested {
        if !events.contains(&event) {
            events.push(event);
        }
    }

    info!(
        endpoint = %config.transport.endpoint,
        kind = %args.kind,
        channel = %args.channel,
        events = ?events,
        "watching channel"
    );

    let callback: EventCallback = Arc::new(print_event);
    let mut watches = Vec::with_capacity(events.len());
    let mut loggers = Vec::with_capacity(events.len());
    for event in events {
        let active = subscribe(&ctx, args.kind, event, &args.channel, Arc::clone(&callback));
        loggers.push(log_transitions(event, active.watch_connected()));
        watches.push(active);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("interrupted, stopping subscriptions");

    drop(watches);
    for logger in loggers {
        logger.abort();
    }
    if !ctx.provider.shutdown() {
        warn!(
            live = ctx.provider.live_leases(),
            "transport still leased at shutdown"
        );
    }
    Ok(())
}
