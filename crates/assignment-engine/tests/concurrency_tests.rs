//! Capacity and exclusivity under concurrent callers
//!
//! The file-backed tests open two engines on one SQLite file, the way two
//! service processes would share a database.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serial_test::serial;

use deskroute_assignment_engine::prelude::*;

fn ticket(contact: String, channel: ChannelType) -> NewTicket {
    NewTicket {
        tenant_id: "acme".into(),
        channel_type: channel,
        contact_external_id: contact,
        contact_name: None,
        priority: Priority::Medium,
    }
}

fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("deskroute-test-{}.db", uuid::Uuid::new_v4()))
}

fn file_config(path: &PathBuf) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.database.url = format!("sqlite:{}", path.display());
    config.database.max_connections = 4;
    config.retry = RetryConfig {
        max_attempts: 50,
        base_delay_ms: 2,
        max_delay_ms: 50,
    };
    config
}

fn cleanup(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

async fn assert_loads_match_tickets(engine: &AssignmentEngine) {
    for agent in engine.list_agents(&"acme".into()).await.unwrap() {
        let held = engine.database().count_active_tickets_for_agent(&agent.id).await.unwrap();
        assert_eq!(agent.current_load as i64, held, "load of agent {} drifted from its tickets", agent.id);
    }
}

async fn seeded_engine() -> Arc<AssignmentEngine> {
    let engine = AssignmentEngine::new_in_memory().await.unwrap();
    engine.create_tenant(&"acme".into(), "Acme").await.unwrap();
    Arc::new(engine)
}

#[tokio::test]
async fn test_concurrent_assignment_of_one_ticket_has_one_winner() {
    let engine = seeded_engine().await;
    for id in ["a1", "a2", "a3"] {
        engine
            .upsert_agent(&AgentProfile::new(id, "acme", id, vec![ChannelType::Sms], 2).with_status(AgentStatus::Online))
            .await
            .unwrap();
    }
    let contested = engine
        .database()
        .insert_ticket(&ticket("+1555".to_string(), ChannelType::Sms))
        .await
        .unwrap();

    let attempts = ["a1", "a2", "a3"].map(|id| {
        let engine = engine.clone();
        let ticket_id = contested.id.clone();
        tokio::spawn(async move {
            engine
                .assign_ticket_to_agent(&ticket_id, &id.into(), AssignmentType::Auto, None, None)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(e) = result {
            assert_eq!(e.conflict(), Some(AssignmentConflict::TicketUnavailable));
        }
    }

    let total_load: u32 = engine
        .list_agents(&"acme".into())
        .await
        .unwrap()
        .iter()
        .map(|a| a.current_load)
        .sum();
    assert_eq!(total_load, 1);
    assert_eq!(engine.assignment_history(&contested.id).await.unwrap().len(), 1);
    assert_loads_match_tickets(&engine).await;
}

#[tokio::test]
async fn test_concurrent_intake_never_exceeds_capacity() {
    let engine = seeded_engine().await;
    engine
        .upsert_agent(
            &AgentProfile::new("a1", "acme", "Alice", vec![ChannelType::Whatsapp], 3).with_status(AgentStatus::Online),
        )
        .await
        .unwrap();

    let intake = (0..10).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create_ticket(ticket(format!("c{}", i), ChannelType::Whatsapp)).await })
    });
    let outcomes: Vec<_> = join_all(intake).await.into_iter().map(|r| r.unwrap().unwrap()).collect();

    let assigned = outcomes.iter().filter(|o| !o.routing.is_queued()).count();
    assert_eq!(assigned, 3);
    assert_eq!(engine.get_agent(&"a1".into()).await.unwrap().unwrap().current_load, 3);
    assert_eq!(engine.database().queue_depth(&"acme".into()).await.unwrap(), 7);
    assert_loads_match_tickets(&engine).await;
}

#[tokio::test]
async fn test_concurrent_closes_and_reassignments_keep_loads_exact() {
    let engine = seeded_engine().await;
    for id in ["a1", "a2"] {
        engine
            .upsert_agent(&AgentProfile::new(id, "acme", id, vec![ChannelType::Messenger], 3).with_status(AgentStatus::Online))
            .await
            .unwrap();
    }
    let mut tickets = Vec::new();
    for i in 0..8 {
        let outcome = engine.create_ticket(ticket(format!("psid-{}", i), ChannelType::Messenger)).await.unwrap();
        tickets.push((outcome.ticket.id, outcome.routing.agent_id().cloned()));
    }
    assert_eq!(engine.database().queue_depth(&"acme".into()).await.unwrap(), 2);

    let work = tickets.into_iter().enumerate().map(|(i, (ticket_id, holder))| {
        let engine = engine.clone();
        tokio::spawn(async move {
            match holder {
                Some(from) if i % 2 == 0 => {
                    let to: AgentId = if from.as_str() == "a1" { "a2".into() } else { "a1".into() };
                    engine.reassign_ticket(&ticket_id, &to, Some("sup-1"), None).await.map(|_| ())
                }
                _ => engine.update_ticket_status(&ticket_id, TicketStatus::Closed).await.map(|_| ()),
            }
        })
    });
    for result in join_all(work).await {
        let outcome = result.unwrap();
        assert!(outcome.is_ok() || matches!(outcome, Err(EngineError::InvalidState(_))), "{:?}", outcome);
    }

    engine.process_queue(&"acme".into()).await.unwrap();
    assert_loads_match_tickets(&engine).await;
}

#[tokio::test]
#[serial]
async fn test_two_engines_share_one_database_file() {
    let path = temp_db_path();
    let config = file_config(&path);

    let first = Arc::new(AssignmentEngine::new(config.clone(), Arc::new(NullPublisher)).await.unwrap());
    let second = Arc::new(AssignmentEngine::new(config, Arc::new(NullPublisher)).await.unwrap());

    first.create_tenant(&"acme".into(), "Acme").await.unwrap();
    first
        .upsert_agent(
            &AgentProfile::new("a1", "acme", "Alice", vec![ChannelType::Telegram], 4).with_status(AgentStatus::Online),
        )
        .await
        .unwrap();

    let intake = (0..12).map(|i| {
        let engine = if i % 2 == 0 { first.clone() } else { second.clone() };
        tokio::spawn(async move { engine.create_ticket(ticket(format!("tg-{}", i), ChannelType::Telegram)).await })
    });
    let outcomes: Vec<_> = join_all(intake).await.into_iter().map(|r| r.unwrap().unwrap()).collect();

    let assigned = outcomes.iter().filter(|o| !o.routing.is_queued()).count();
    assert_eq!(assigned, 4);
    let agent = second.get_agent(&"a1".into()).await.unwrap().unwrap();
    assert_eq!(agent.current_load, 4);
    assert_eq!(second.database().queue_depth(&"acme".into()).await.unwrap(), 8);
    assert_loads_match_tickets(&first).await;

    first.database().close().await;
    second.database().close().await;
    cleanup(&path);
}

#[tokio::test]
#[serial]
async fn test_concurrent_closes_release_each_slot_once() {
    let path = temp_db_path();
    let config = file_config(&path);

    let first = Arc::new(AssignmentEngine::new(config.clone(), Arc::new(NullPublisher)).await.unwrap());
    let second = Arc::new(AssignmentEngine::new(config, Arc::new(NullPublisher)).await.unwrap());

    first.create_tenant(&"acme".into(), "Acme").await.unwrap();
    first
        .upsert_agent(
            &AgentProfile::new("a1", "acme", "Alice", vec![ChannelType::Email], 2).with_status(AgentStatus::Online),
        )
        .await
        .unwrap();
    let held = first.create_ticket(ticket("mail-1".to_string(), ChannelType::Email)).await.unwrap();
    first.create_ticket(ticket("mail-2".to_string(), ChannelType::Email)).await.unwrap();

    let closes = [first.clone(), second.clone(), first.clone(), second.clone()].map(|engine| {
        let ticket_id = held.ticket.id.clone();
        tokio::spawn(async move { engine.update_ticket_status(&ticket_id, TicketStatus::Closed).await })
    });
    let results: Vec<_> = join_all(closes).await.into_iter().map(|r| r.unwrap()).collect();

    let released = results
        .iter()
        .filter(|r| matches!(r, Ok(update) if update.released_agent.is_some()))
        .count();
    assert_eq!(released, 1);
    assert!(results
        .iter()
        .all(|r| r.is_ok() || matches!(r, Err(EngineError::InvalidState(_)))));
    assert_eq!(first.get_agent(&"a1".into()).await.unwrap().unwrap().current_load, 1);
    assert_loads_match_tickets(&second).await;

    first.database().close().await;
    second.database().close().await;
    cleanup(&path);
}
