//! The `serve` session: one processor, one dispatcher, envelopes on stdio.

use a2ui_runtime::{
    Catalog, DataContext, DispatchError, DispatchId, DispatchedEvent, Dispatcher, EventStream,
    MessageProcessor, RuntimeConfig, ServerMessage, validate_messages,
};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::wire::{self, Inbound, Outbound, errors_envelope};

/// Outcome of one dispatched action, delivered back to the session loop.
#[derive(Debug)]
pub struct ReplyOutcome {
    pub id: DispatchId,
    pub result: Result<Vec<ServerMessage>, DispatchError>,
}

/// Receivers the session loop polls besides stdin.
pub struct SessionChannels {
    pub events: EventStream,
    pub replies: mpsc::UnboundedReceiver<ReplyOutcome>,
}

pub struct Session {
    config: HostConfig,
    processor: MessageProcessor,
    dispatcher: Dispatcher,
    replies: mpsc::UnboundedSender<ReplyOutcome>,
}

impl Session {
    pub fn new(config: HostConfig, runtime: RuntimeConfig) -> (Self, SessionChannels) {
        let (dispatcher, events) = Dispatcher::from_config(&runtime);
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let processor = MessageProcessor::new(Catalog::with_extensions(), runtime);

        let session = Self {
            config,
            processor,
            dispatcher,
            replies: replies_tx,
        };
        let channels = SessionChannels {
            events,
            replies: replies_rx,
        };
        (session, channels)
    }

    pub fn ready(&self) -> Outbound {
        let mut catalog: Vec<&str> = self.processor.catalog().type_names().collect();
        catalog.sort_unstable();

        Outbound::Ready {
            surface_id: self.config.surface_id.clone(),
            capabilities: json!({
                "catalog": catalog,
                "framing": self.config.framing.as_str(),
                "validateInbound": self.config.validate_inbound,
            }),
        }
    }

    /// Handles one inbound envelope. Actions are dispatched here; their event
    /// and reply come back through [`SessionChannels`].
    pub fn handle(&mut self, inbound: Inbound) -> Vec<Outbound> {
        match inbound {
            Inbound::Messages { messages } => self.apply_raw(messages),
            Inbound::Action {
                surface_id,
                component_id,
                data_context_path,
            } => {
                let surface_id = surface_id.unwrap_or_else(|| self.config.surface_id.clone());
                let dispatched = self.dispatch_action(
                    &surface_id,
                    &component_id,
                    data_context_path.as_deref(),
                );
                match dispatched {
                    Ok(()) => Vec::new(),
                    Err(message) => vec![errors_envelope(vec![message])],
                }
            }
            Inbound::SetData {
                surface_id,
                path,
                value,
                data_context_path,
            } => {
                let surface_id = surface_id.unwrap_or_else(|| self.config.surface_id.clone());
                let ctx = self.context(&surface_id, data_context_path.as_deref());
                match self
                    .processor
                    .set_data(&surface_id, &path, value, ctx.as_ref())
                {
                    Ok(()) => vec![self.snapshot(&surface_id)],
                    Err(err) => vec![errors_envelope(vec![err.to_string()])],
                }
            }
            Inbound::Reply { id, messages } => {
                let (decoded, mut errors) = decode_messages(messages);
                if let Err(err) = self.dispatcher.complete(id, decoded) {
                    errors.push(err.to_string());
                }
                if errors.is_empty() {
                    Vec::new()
                } else {
                    vec![errors_envelope(errors)]
                }
            }
        }
    }

    pub fn on_event(&self, event: DispatchedEvent) -> Outbound {
        // The peer answers with a `reply` envelope, completed by id.
        let DispatchedEvent { id, message, .. } = event;
        debug!(dispatch = %id, "forwarding client event");
        Outbound::Event { id, event: message }
    }

    pub fn on_reply(&mut self, outcome: ReplyOutcome) -> Vec<Outbound> {
        match outcome.result {
            Ok(messages) => {
                debug!(dispatch = %outcome.id, count = messages.len(), "applying reply");
                self.apply(messages, Vec::new())
            }
            Err(err) => vec![errors_envelope(vec![err.to_string()])],
        }
    }

    fn dispatch_action(
        &mut self,
        surface_id: &str,
        component_id: &str,
        data_context_path: Option<&str>,
    ) -> Result<(), String> {
        let ctx = self.context(surface_id, data_context_path);
        let event = self
            .processor
            .user_action(surface_id, component_id, ctx.as_ref())
            .map_err(|err| err.to_string())?;
        let pending = self.dispatcher.dispatch(event).map_err(|err| err.to_string())?;

        let replies = self.replies.clone();
        tokio::spawn(async move {
            let id = pending.id();
            let result = pending.wait().await;
            if replies.send(ReplyOutcome { id, result }).is_err() {
                debug!(dispatch = %id, "session closed before reply");
            }
        });
        Ok(())
    }

    fn context(&self, surface_id: &str, data_context_path: Option<&str>) -> Option<DataContext> {
        let path = data_context_path?;
        let surface = self.processor.surface(surface_id)?;
        Some(DataContext::at(surface.data_model(), path))
    }

    fn apply_raw(&mut self, messages: Value) -> Vec<Outbound> {
        let mut errors = if self.config.validate_inbound {
            validate_messages(&messages)
        } else {
            Vec::new()
        };

        let raw = match messages {
            Value::Array(items) => items,
            single => vec![single],
        };
        let (decoded, decode_errors) = decode_messages(raw);
        errors.extend(decode_errors);
        self.apply(decoded, errors)
    }

    fn apply(&mut self, messages: Vec<ServerMessage>, mut errors: Vec<String>) -> Vec<Outbound> {
        let mut touched: Vec<String> = Vec::new();
        for message in &messages {
            let surface_id = message.surface_id();
            if !touched.iter().any(|id| id == surface_id) {
                touched.push(surface_id.to_string());
            }
        }

        errors.extend(
            self.processor
                .process_messages(messages)
                .into_iter()
                .map(|err| err.to_string()),
        );

        let mut outbound = Vec::with_capacity(touched.len() + 1);
        if !errors.is_empty() {
            warn!(count = errors.len(), "message batch reported errors");
            outbound.push(errors_envelope(errors));
        }
        outbound.extend(touched.iter().map(|id| self.snapshot(id)));
        outbound
    }

    fn snapshot(&self, surface_id: &str) -> Outbound {
        let Some(surface) = self.processor.surface(surface_id) else {
            return Outbound::Snapshot {
                surface_id: surface_id.to_string(),
                root: None,
                catalog_id: None,
                styles: None,
                tree: Value::Null,
            };
        };

        let tree = self
            .processor
            .component_tree(surface_id)
            .map(|tree| tree.snapshot(&surface.resolver(), self.processor.catalog()))
            .unwrap_or(Value::Null);
        Outbound::Snapshot {
            surface_id: surface_id.to_string(),
            root: Some(surface.root_id().to_string()),
            catalog_id: surface.catalog_id().map(str::to_string),
            styles: surface.styles().cloned(),
            tree,
        }
    }
}

fn decode_messages(raw: Vec<Value>) -> (Vec<ServerMessage>, Vec<String>) {
    let mut decoded = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();

    for (index, value) in raw.into_iter().enumerate() {
        match ServerMessage::from_value(value) {
            Ok(message) => decoded.push(message),
            Err(err) => errors.push(format!("[Message {index}] {err}")),
        }
    }
    (decoded, errors)
}

/// Runs the stdio session until stdin closes.
pub async fn serve(config: HostConfig, runtime: RuntimeConfig) -> Result<()> {
    let framing = config.framing;
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(config.outbound_queue_cap);
    let (in_tx, mut in_rx) = mpsc::channel(config.outbound_queue_cap);
    let (mut session, mut channels) = Session::new(config, runtime);

    let writer = tokio::spawn(wire::writer_loop(tokio::io::stdout(), framing, out_rx));
    let reader = tokio::spawn(wire::reader_loop(tokio::io::stdin(), framing, in_tx));

    info!(framing = framing.as_str(), "session started");
    out_tx
        .send(session.ready())
        .await
        .context("failed to queue ready envelope")?;

    loop {
        let outbound = tokio::select! {
            inbound = in_rx.recv() => match inbound {
                Some(Ok(inbound)) => session.handle(inbound),
                Some(Err(message)) => vec![errors_envelope(vec![message])],
                None => break,
            },
            Some(event) = channels.events.next() => vec![session.on_event(event)],
            Some(outcome) = channels.replies.recv() => session.on_reply(outcome),
        };

        for envelope in outbound {
            out_tx
                .send(envelope)
                .await
                .context("outbound queue closed")?;
        }
    }

    info!(
        pending = session.dispatcher.pending_count(),
        "stdin closed, ending session"
    );
    drop(out_tx);

    reader
        .await
        .context("reader task failed")?
        .context("reader loop terminated with error")?;
    writer
        .await
        .context("writer task failed")?
        .context("writer loop terminated with error")?;
    Ok(())
}
