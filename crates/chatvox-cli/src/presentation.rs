//! Terminal rendering for events, users and statistics.
//!
//! Format-only: nothing here talks to the service.

use chatvox_core::{
    CacheStats, CostStats, PermissionStats, ProcessorStats, TtsEvent, UserPermission,
};
use chatvox_engine::EngineStatus;

/// Truncate to `max_chars` characters, adding "..." if needed.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// One-line rendering of an event, or `None` for events not worth printing.
pub fn format_event(event: &TtsEvent) -> Option<String> {
    match event {
        TtsEvent::QueueUpdate { snapshot } => Some(format!(
            "[queue] {}/{}{}",
            snapshot.depth,
            snapshot.max_size,
            if snapshot.paused { " (paused)" } else { "" }
        )),
        TtsEvent::NowPlaying { item: Some(item) } => {
            let mut line = format!(
                "[playing] {}: {}",
                item.username,
                truncate_string(&item.text, 60)
            );
            if let Some(engine) = &item.engine {
                line.push_str(&format!(" via {engine}"));
            }
            if item.from_cache {
                line.push_str(" (cached)");
            }
            Some(line)
        }
        TtsEvent::NowPlaying { item: None } | TtsEvent::StatsUpdate { .. } => None,
        TtsEvent::PlayAudio {
            request_id,
            mime,
            audio_base64,
        } => Some(format!(
            "[playAudio] {request_id} {mime} ({} base64 chars)",
            audio_base64.len()
        )),
        TtsEvent::StopAudio { request_id } => Some(format!("[stopAudio] {request_id}")),
        TtsEvent::RequestFinished {
            request_id,
            status,
            detail,
        } => Some(match detail {
            Some(detail) => format!("[finished] {request_id} {status:?}: {detail}"),
            None => format!("[finished] {request_id} {status:?}"),
        }),
    }
}

pub fn print_processor_stats(stats: &ProcessorStats) {
    println!(
        "Requests: {} received, {} admitted, {} denied, {} rate-limited, {} dropped",
        stats.received, stats.admitted, stats.denied, stats.rate_limited, stats.dropped
    );
    println!(
        "Outcomes: {} completed, {} failed, {} skipped",
        stats.completed, stats.failed, stats.skipped
    );
}

pub fn print_cost_stats(cost: &CostStats) {
    println!(
        "Spend: ${:.4} this hour, ${:.4} today, ${:.4} total (budget {:?})",
        cost.hour_total, cost.day_total, cost.total, cost.level
    );
    if cost.engines.is_empty() {
        println!("No billed synthesis yet.");
        return;
    }
    println!("{:<16} {:>10} {:>8} {:>10}", "ENGINE", "CHARS", "REQS", "COST");
    print_separator(47);
    for (engine, spend) in &cost.engines {
        let blocked = if cost.blocked_engines.contains(engine) {
            " blocked"
        } else {
            ""
        };
        println!(
            "{:<16} {:>10} {:>8} {:>10.4}{blocked}",
            truncate_string(engine.as_str(), 16),
            spend.characters,
            spend.requests,
            spend.cost
        );
    }
    if cost.paid_engines_blocked {
        println!("Paid engines are blocked by the daily critical threshold.");
    }
}

pub fn print_cache_stats(cache: &CacheStats) {
    println!(
        "Cache: {} entries, {}/{} bytes, {} hits, {} misses",
        cache.entries, cache.total_bytes, cache.max_bytes, cache.hits, cache.misses
    );
    println!(
        "Evictions: {} expired, {} over capacity; {} write failures",
        cache.ttl_evictions, cache.lru_evictions, cache.write_failures
    );
}

pub fn print_permission_stats(stats: &PermissionStats) {
    println!(
        "Users: {} known, {} allowed, {} blacklisted, {} with a voice",
        stats.total_users, stats.allowed, stats.blacklisted, stats.with_assigned_voice
    );
}

pub fn print_users(users: &[UserPermission]) {
    if users.is_empty() {
        println!("No users recorded.");
        return;
    }
    println!(
        "{:<20} {:<16} {:<8} {:<6} {:<12}",
        "USER ID", "NAME", "ALLOWED", "LEVEL", "VOICE"
    );
    print_separator(66);
    for user in users {
        let allowed = if user.is_blacklisted {
            "blocked"
        } else if user.allow_tts {
            "yes"
        } else {
            "no"
        };
        println!(
            "{:<20} {:<16} {:<8} {:<6} {:<12}",
            truncate_string(&user.user_id, 20),
            truncate_string(&user.username, 16),
            allowed,
            user.team_level,
            user.assigned_voice.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_engines(engines: &[EngineStatus]) {
    println!(
        "{:<16} {:<8} {:<9} {:>8} {:>12}",
        "ENGINE", "ENABLED", "CIRCUIT", "ERRORS", "COST/CHAR"
    );
    print_separator(57);
    for engine in engines {
        println!(
            "{:<16} {:<8} {:<9} {:>7.0}% {:>12.6}",
            truncate_string(engine.id.as_str(), 16),
            if engine.enabled { "yes" } else { "no" },
            format!("{:?}", engine.circuit),
            engine.error_rate * 100.0,
            engine.cost_per_char
        );
    }
}

#[cfg(test)]
mod tests {
    use chatvox_core::{QueueSnapshot, RequestId, RequestStatus};

    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("ééééé", 4), "é...");
    }

    #[test]
    fn test_event_lines() {
        let paused = TtsEvent::queue_update(QueueSnapshot {
            depth: 2,
            max_size: 10,
            paused: true,
            next: Vec::new(),
        });
        assert_eq!(format_event(&paused).unwrap(), "[queue] 2/10 (paused)");

        let id = RequestId::new();
        let finished = TtsEvent::finished(id, RequestStatus::Dropped, Some("queue full".into()));
        assert_eq!(
            format_event(&finished).unwrap(),
            format!("[finished] {id} Dropped: queue full")
        );

        assert!(format_event(&TtsEvent::now_playing(None)).is_none());
        assert!(format_event(&TtsEvent::stats(ProcessorStats::default())).is_none());
    }
}
