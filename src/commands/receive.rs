use std::io::{self, Write};
use std::time::Duration;

use mediashare_transfer::TransferService;
use mediashare_transfer::media::destination_dir;
use mediashare_transfer::models::{SessionInfo, ShareableItem, TransferState};

use super::discover::collect_sessions;
use super::progress::format_bytes;
use super::{finish, run_session};
use crate::bootstrap::AppContext;

pub(crate) async fn run(
    context: &AppContext,
    target: Option<(String, u16)>,
    accept_all: bool,
    wait_secs: u64,
) -> anyhow::Result<()> {
    let service = context.service.clone();
    let session = match target {
        Some((host, port)) => SessionInfo {
            device_name: format!("{host}:{port}"),
            host,
            port,
            session_token: String::new(),
        },
        None => match pick_sender(&service, wait_secs).await? {
            Some(session) => session,
            None => return Ok(()),
        },
    };

    let worker = service.clone();
    let dialed = session.clone();
    let state = run_session(&service, "receive_offer", async move {
        worker.connect_and_receive_offer(dialed).await;
    })
    .await?;
    let items = match &state {
        TransferState::Offering { items } => items.clone(),
        _ => return finish(&state),
    };

    print_offer(&session, &items);
    let approved_ids = if accept_all {
        items.iter().map(|item| item.id.clone()).collect()
    } else {
        prompt_approval(&items)?
    };
    if approved_ids.is_empty() {
        service.reject_offer();
        println!("Offer declined.");
        return Ok(());
    }

    let worker = service.clone();
    let state = run_session(&service, "receive", async move {
        worker.approve_and_receive(approved_ids).await;
    })
    .await?;
    if state == TransferState::Done {
        println!("Files saved to {}", destination_dir(&service.settings())?.display());
    }
    finish(&state)
}

async fn pick_sender(
    service: &TransferService,
    wait_secs: u64,
) -> anyhow::Result<Option<SessionInfo>> {
    println!("Looking for senders for {wait_secs}s...");
    let sessions = collect_sessions(service, Duration::from_secs(wait_secs)).await?;
    match sessions.len() {
        0 => {
            println!("No senders found.");
            Ok(None)
        }
        1 => Ok(sessions.into_iter().next()),
        count => {
            let Some(index) = prompt_sender(count)? else {
                return Ok(None);
            };
            Ok(sessions.into_iter().nth(index))
        }
    }
}

fn prompt_sender(max: usize) -> anyhow::Result<Option<usize>> {
    loop {
        print!("\nSelect sender [1-{max}] or 'q' to quit: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match input.parse::<usize>() {
            Ok(selection) if (1..=max).contains(&selection) => return Ok(Some(selection - 1)),
            _ => println!("Enter a number between 1 and {max}, or 'q' to quit."),
        }
    }
}

fn print_offer(session: &SessionInfo, items: &[ShareableItem]) {
    println!("\n\"{}\" wants to share:", session.device_name);
    for (index, item) in items.iter().enumerate() {
        println!(
            "  {}. {} - {} ({})",
            index + 1,
            item.artist,
            item.title,
            format_bytes(item.size_bytes)
        );
    }
}

fn prompt_approval(items: &[ShareableItem]) -> anyhow::Result<Vec<String>> {
    loop {
        print!("\nAccept [a]ll, [n]one, or a list like 1,3: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        match parse_selection(&input, items.len()) {
            Some(indices) => {
                return Ok(indices
                    .into_iter()
                    .map(|index| items[index].id.clone())
                    .collect());
            }
            None => println!("Could not read that selection."),
        }
    }
}

/// Parses an approval answer into zero-based indices in offer order. `None` means the
/// answer was not understood, a blank answer included.
pub(crate) fn parse_selection(input: &str, count: usize) -> Option<Vec<usize>> {
    let answer = input.trim();
    if answer.is_empty() {
        return None;
    }
    if answer.eq_ignore_ascii_case("a") || answer.eq_ignore_ascii_case("all") {
        return Some((0..count).collect());
    }
    if answer.eq_ignore_ascii_case("n") || answer.eq_ignore_ascii_case("none") {
        return Some(Vec::new());
    }

    let mut selected = vec![false; count];
    let mut numbers = answer.split([',', ' ']).filter(|part| !part.is_empty()).peekable();
    numbers.peek()?;
    for part in numbers {
        let number = part.parse::<usize>().ok()?;
        if !(1..=count).contains(&number) {
            return None;
        }
        selected[number - 1] = true;
    }
    Some(
        selected
            .iter()
            .enumerate()
            .filter(|(_, chosen)| **chosen)
            .map(|(index, _)| index)
            .collect(),
    )
}

#[cfg(test)]
#[path = "../../tests/commands/receive_tests.rs"]
mod tests;
