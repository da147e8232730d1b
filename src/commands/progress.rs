use mediashare_transfer::TransferService;
use mediashare_transfer::models::TransferState;
use tokio::task::JoinHandle;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub(crate) fn format_bytes(bytes: u64) -> String {
    let value = bytes as f64;
    if value >= GIB {
        format!("{:.1} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.1} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

pub(crate) fn describe_state(state: &TransferState) -> String {
    match state {
        TransferState::Idle => "Idle".to_string(),
        TransferState::Connecting => "Connecting...".to_string(),
        TransferState::Offering { items } => format!("Offering {} item(s)", items.len()),
        TransferState::WaitingApproval => "Waiting for the receiver...".to_string(),
        TransferState::Transferring {
            item,
            bytes_transferred,
            total_bytes,
            item_index,
            total_items,
        } => {
            let percent = whole_percent(state);
            format!(
                "[{}/{}] {} - {}% ({} of {})",
                item_index + 1,
                total_items,
                item.title,
                percent,
                format_bytes(*bytes_transferred),
                format_bytes(*total_bytes)
            )
        }
        TransferState::Done => "Done".to_string(),
        TransferState::Error { message } => format!("Failed: {message}"),
    }
}

fn whole_percent(state: &TransferState) -> u32 {
    state
        .progress()
        .map(|fraction| (fraction * 100.0).floor() as u32)
        .unwrap_or(0)
}

/// What decides whether a state earns a new line. Chunk updates inside the same whole
/// percent of the same item share a key.
pub(crate) fn progress_key(state: &TransferState) -> String {
    match state {
        TransferState::Transferring {
            item,
            item_index,
            total_items,
            ..
        } => format!(
            "{}/{}:{}:{}",
            item_index,
            total_items,
            item.id,
            whole_percent(state)
        ),
        other => describe_state(other),
    }
}

pub(crate) fn spawn_printer(service: &TransferService) -> JoinHandle<()> {
    let mut updates = service.subscribe();
    tokio::spawn(async move {
        let mut last_key = String::new();
        while let Some(state) = updates.changed().await {
            let key = progress_key(&state);
            if key != last_key {
                eprintln!("{}", describe_state(&state));
                last_key = key;
            }
        }
    })
}

#[cfg(test)]
#[path = "../../tests/commands/progress_tests.rs"]
mod tests;
