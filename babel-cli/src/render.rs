//! Plain-text rendering of query events

use babel_common::events::{DisplayUpdate, ItemKind, QueryEvent, RequestPhase};

pub fn print_event(event: &QueryEvent) {
    match event {
        QueryEvent::Updated(update) => print!("{}", format_update(update)),
        QueryEvent::ProviderFailed { .. } | QueryEvent::ConfigurationError { .. } => {
            eprintln!("{}", format_notice(event))
        }
        _ => println!("{}", format_notice(event)),
    }
}

/// One-line rendering of everything except display updates
pub fn format_notice(event: &QueryEvent) -> String {
    match event {
        QueryEvent::DetectionResolved {
            request_id,
            source,
            target,
            confirmed,
            ..
        } => {
            let hint = if *confirmed { "" } else { " (unconfirmed)" };
            format!("{} {} -> {}{}", request_id, source, target, hint)
        }
        QueryEvent::ProviderFailed {
            provider_id,
            code,
            message,
            ..
        } => format!("! {} failed ({}): {}", provider_id, code, message),
        QueryEvent::ConfigurationError { message, .. } => format!("! {}", message),
        QueryEvent::Cleared { request_id, .. } => format!("{} cleared", request_id),
        QueryEvent::Updated(update) => format!("{} {}", update.request_id, update.phase),
    }
}

/// Full section list; intermediate phases with nothing to show are skipped
pub fn format_update(update: &DisplayUpdate) -> String {
    if update.sections.is_empty() && !update.phase.is_terminal() {
        return String::new();
    }

    let mut out = format!("{} [{}]", update.request_id, update.phase);
    if update.loading {
        out.push_str(" loading...");
    }
    out.push('\n');

    if update.sections.is_empty() && update.phase == RequestPhase::Settled {
        out.push_str("  (no results)\n");
    }

    for section in &update.sections {
        out.push_str(&format!("== {} ==\n", section.title));
        for item in &section.items {
            if let Some(label) = &item.label {
                out.push_str(&format!("  -- {} --\n", label));
            }
            let prefix = match item.kind {
                ItemKind::Error => "  ! ",
                _ => "  ",
            };
            for line in &item.lines {
                out.push_str(prefix);
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}
