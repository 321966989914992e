//! `tsvwatch get`: look up the N-th event of one device.

use super::output::print_table;
use super::StorageArgs;
use anyhow::{Context, Result};
use clap::Args;
use std::process::ExitCode;
use tsvwatch::{EventLookup, LookupError};
use tsvwatch_protocol::{Event, EVENT_FIELDS};

/// Exit codes, one per lookup failure class.
pub const EXIT_NOT_FOUND: u8 = 2;
pub const EXIT_UNAVAILABLE: u8 = 3;
pub const EXIT_BAD_INPUT: u8 = 4;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Device unit GUID
    #[arg(short, long)]
    pub device: String,

    /// 1-based position among the device's events
    #[arg(short, long, allow_negative_numbers = true)]
    pub ordinal: i64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub storage: StorageArgs,
}

pub async fn run(args: GetArgs) -> Result<ExitCode> {
    let config = args.storage.load_config()?;
    let store = args.storage.open(&config).await?;
    let lookup = EventLookup::new(store.clone());

    let result = lookup.get_by_ordinal(&args.device, args.ordinal).await;
    store.close().await;

    let event = match result {
        Ok(event) => event,
        Err(err) => {
            eprintln!("{}", err);
            return Ok(ExitCode::from(exit_code(&err)));
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&event).context("Failed to serialize event")?;
        println!("{}", json);
    } else {
        print_table(&["field", "value"], event_rows(&event));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn exit_code(err: &LookupError) -> u8 {
    match err {
        LookupError::NotFound(_) => EXIT_NOT_FOUND,
        LookupError::Unavailable(_) => EXIT_UNAVAILABLE,
        LookupError::BadInput(_) => EXIT_BAD_INPUT,
        LookupError::Internal => 1,
    }
}

fn event_rows(event: &Event) -> Vec<Vec<String>> {
    let mut rows = vec![vec!["id".to_string(), event.id.to_string()]];
    rows.extend(
        EVENT_FIELDS
            .iter()
            .map(|field| vec![field.key.to_string(), (field.get)(event).encode()]),
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_failure_class_has_its_own_code() {
        assert_eq!(exit_code(&LookupError::NotFound("x".into())), 2);
        assert_eq!(exit_code(&LookupError::Unavailable("x".into())), 3);
        assert_eq!(exit_code(&LookupError::BadInput("x".into())), 4);
        assert_eq!(exit_code(&LookupError::Internal), 1);
    }

    #[test]
    fn rows_cover_id_and_every_field() {
        let event = Event {
            unit_guid: "G".into(),
            block: true,
            ..Event::default()
        };
        let rows = event_rows(&event);
        assert_eq!(rows.len(), 1 + EVENT_FIELDS.len());
        assert!(rows.contains(&vec!["unit_guid".to_string(), "G".to_string()]));
        assert!(rows.contains(&vec!["block".to_string(), "true".to_string()]));
    }
}
