use super::*;
use mediashare_transfer::models::ShareableItem;

fn track(title: &str) -> ShareableItem {
    ShareableItem {
        id: "t1".to_string(),
        title: title.to_string(),
        artist: "Alice Coltrane".to_string(),
        album: None,
        size_bytes: 4 * 1024 * 1024,
        mime_type: "audio/flac".to_string(),
    }
}

#[test]
fn format_bytes_should_pick_readable_units() {
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(1536), "1.5 KiB");
    assert_eq!(format_bytes(4 * 1024 * 1024), "4.0 MiB");
    assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
}

#[test]
fn describe_state_should_show_batch_position_and_percent() {
    let state = TransferState::Transferring {
        item: track("Journey in Satchidananda"),
        bytes_transferred: 1024 * 1024,
        total_bytes: 4 * 1024 * 1024,
        item_index: 1,
        total_items: 3,
    };

    assert_eq!(
        describe_state(&state),
        "[2/3] Journey in Satchidananda - 25% (1.0 MiB of 4.0 MiB)"
    );
}

#[test]
fn progress_key_should_collapse_steps_within_a_percent() {
    let at = |bytes| TransferState::Transferring {
        item: track("Blue Nile"),
        bytes_transferred: bytes,
        total_bytes: 10_000,
        item_index: 0,
        total_items: 1,
    };

    assert_eq!(progress_key(&at(1_010)), progress_key(&at(1_090)));
    assert_ne!(progress_key(&at(1_010)), progress_key(&at(1_110)));
    assert_ne!(describe_state(&at(1_010)), describe_state(&at(1_090)));
    assert_eq!(progress_key(&TransferState::Done), describe_state(&TransferState::Done));
}

#[test]
fn describe_state_should_surface_error_message() {
    assert_eq!(
        describe_state(&TransferState::error("Receiver declined")),
        "Failed: Receiver declined"
    );
    assert_eq!(
        describe_state(&TransferState::Offering {
            items: vec![track("A"), track("B")]
        }),
        "Offering 2 item(s)"
    );
}
