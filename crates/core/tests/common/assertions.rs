//! Custom assertion helpers over event sequences.

use pl_protocol::ipc::Event;
use pl_protocol::run_models::RunStatus;
use std::time::Duration;
use tokio::sync::mpsc;

/// Collect events until a terminal run event, channel close or timeout.
#[allow(dead_code)]
pub async fn collect_events_until_timeout(
    rx: &mut mpsc::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    let mut events = Vec::new();
    let start = tokio::time::Instant::now();

    while start.elapsed() < timeout {
        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Some(event)) => {
                let is_terminal = event.is_terminal();
                events.push(event);
                if is_terminal {
                    break;
                }
            }
            Ok(None) => break,  // Channel closed
            Err(_) => continue, // Timeout, keep waiting
        }
    }

    events
}

/// Drain whatever is already buffered in the channel.
#[allow(dead_code)]
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Assert that a run's events start with RunStarted and end with a terminal event.
#[allow(dead_code)]
pub fn assert_event_sequence(events: &[Event]) {
    assert!(!events.is_empty(), "Event sequence is empty");

    assert!(
        matches!(events[0], Event::RunStarted { .. }),
        "First event should be RunStarted, got: {:?}",
        events[0]
    );

    let last = &events[events.len() - 1];
    assert!(
        last.is_terminal(),
        "Last event should be terminal, got: {last:?}"
    );
}

/// Whether the events contain a RunStatusUpdate with the given status.
#[allow(dead_code)]
pub fn has_status_update(events: &[Event], status: RunStatus) -> bool {
    events.iter().any(|e| {
        matches!(
            e,
            Event::RunStatusUpdate { status: s, .. } if *s == status
        )
    })
}

/// Indexes of StepStarted events, in emission order.
#[allow(dead_code)]
pub fn started_steps(events: &[Event]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StepStarted { step_index, .. } => Some(*step_index),
            _ => None,
        })
        .collect()
}

/// Live output snapshots published for one step.
#[allow(dead_code)]
pub fn step_outputs(events: &[Event], index: usize) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StepOutput {
                step_index, text, ..
            } if *step_index == index => Some(text.clone()),
            _ => None,
        })
        .collect()
}
