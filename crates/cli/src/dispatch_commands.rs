use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result},
    supportdesk_agents::{
        EscalationGate, RetryPolicy, ToolRegistry,
        providers::{build_classifier, build_model_chain},
    },
    supportdesk_auto_reply::SessionDispatcher,
    supportdesk_channels::{LogOutbound, OutboundRegistry},
    supportdesk_common::{DispatchOutcome, DispatchResult, InboundEvent},
    supportdesk_config::{SessionStoreKind, SessionsConfig, SupportdeskConfig},
    supportdesk_knowledge::{KnowledgeBase, register_tools},
    supportdesk_sessions::{FileSessionStore, InMemorySessionStore, SessionStore},
    tracing::{error, info},
};

/// Events as a JSON array, or one JSON object per line.
pub fn parse_events(raw: &str) -> Result<Vec<InboundEvent>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid event array");
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid event on line {}", i + 1))
        })
        .collect()
}

fn session_store(config: &SessionsConfig) -> Result<Arc<dyn SessionStore>> {
    match config.store {
        SessionStoreKind::Memory => Ok(Arc::new(InMemorySessionStore::new())),
        SessionStoreKind::File => {
            let dir = config
                .dir
                .clone()
                .or_else(|| supportdesk_config::data_dir().map(|d| d.join("sessions")))
                .context("no sessions directory configured and no user data directory")?;
            info!(dir = %dir.display(), "using file session store");
            Ok(Arc::new(FileSessionStore::new(dir)))
        },
    }
}

/// Wire up the dispatcher from config.
pub fn build_dispatcher(config: &SupportdeskConfig) -> Result<SessionDispatcher> {
    let kb = Arc::new(KnowledgeBase::load(&config.knowledge)?);
    let mut tools = ToolRegistry::new();
    register_tools(&mut tools, kb);

    let model = build_model_chain(&config.models, RetryPolicy::from(&config.resilience))?;
    let gate = EscalationGate::new(build_classifier(&config.models));

    Ok(SessionDispatcher::builder(
        Arc::new(model),
        session_store(&config.sessions)?,
        OutboundRegistry::uniform(Arc::new(LogOutbound)),
    )
    .config(config)
    .tools(tools)
    .gate(gate)
    .build())
}

async fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
            .await?
            .context("failed to read stdin"),
    }
}

pub async fn dispatch(config: &SupportdeskConfig, input: Option<&Path>) -> Result<()> {
    let events = parse_events(&read_input(input).await?)?;
    let dispatcher = Arc::new(build_dispatcher(config)?);
    info!(events = events.len(), "dispatching");

    let handles: Vec<_> = events
        .into_iter()
        .map(|event| {
            let dispatcher = Arc::clone(&dispatcher);
            let event_id = event.external_event_id.clone();
            let handle =
                tokio::spawn(async move { dispatcher.handle_inbound_event(event).await });
            (event_id, handle)
        })
        .collect();

    let mut failed = 0;
    for (event_id, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "dispatch task failed");
                DispatchResult::error(format!("dispatch task failed: {e}"))
            },
        };
        if result.outcome == DispatchOutcome::Error {
            failed += 1;
        }
        let line = serde_json::json!({ "eventId": event_id, "result": result });
        println!("{line}");
    }

    if failed > 0 {
        eprintln!("{failed} event(s) failed");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, supportdesk_common::ChannelKind};

    #[test]
    fn parses_json_lines_and_arrays() {
        let lines = concat!(
            r#"{"channelKind":"chat","externalThreadKey":"C1:1","externalEventId":"e1","messageText":"hi"}"#,
            "\n\n",
            r#"{"channelKind":"ticket","externalThreadKey":"T9","externalEventId":"e2","messageText":"help"}"#,
            "\n"
        );
        let events = parse_events(lines).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].channel_kind, ChannelKind::Ticket);

        let array = r#"  [{"channelKind":"chat","externalThreadKey":"C1:1","externalEventId":"e1","messageText":"hi"}]"#;
        assert_eq!(parse_events(array).unwrap().len(), 1);
    }

    #[test]
    fn bad_line_is_reported_with_its_number() {
        let raw = "{\"channelKind\":\"chat\",\"externalThreadKey\":\"k\",\"externalEventId\":\"e\",\"messageText\":\"m\"}\nnot json\n";
        let err = parse_events(raw).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn file_store_uses_configured_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionsConfig {
            store: SessionStoreKind::File,
            dir: Some(tmp.path().to_path_buf()),
        };
        assert!(session_store(&config).is_ok());
    }

    #[test]
    fn missing_corpus_fails_dispatcher_setup() {
        let mut config = SupportdeskConfig::default();
        config.knowledge.corpus[0].path = "/nonexistent/knowledge.jsonl".into();
        assert!(build_dispatcher(&config).is_err());
    }
}
