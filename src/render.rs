//! Plain-text renderings for the admin shell.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::engine::{percentage, FollowerSummary, PatientSummary, RecommendationSummary};
use crate::model::{
    BotProfile, BotSettings, FollowEventDryRun, FollowEventFlow, FollowerPage, GlucoseReading,
    HealthRecommendation, LiffApp, LineFollower, LineInsights, PatientRecord, PatientStats,
};
use crate::view::ViewMode;

fn date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn share(out: &mut String, label: &str, count: u64, total: u64) {
    let _ = writeln!(out, "{}: {} ({:.1}%)", label, count, percentage(count, total));
}

/// Show the last four characters of a secret.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(8), tail)
}

pub fn patients(mode: ViewMode, visible: &[PatientRecord], summary: &PatientSummary) -> String {
    let mut out = String::new();
    match mode {
        ViewMode::Cards => {
            if visible.is_empty() {
                let _ = writeln!(out, "No patients match the current filters.");
            }
            for p in visible {
                let _ = writeln!(out, "== {} ({})", p.display_name, p.line_user_id);
                let _ = writeln!(
                    out,
                    "   avg glucose {:.0} mg/dL | A1C {:.1}% | in range {:.0}% | {} readings",
                    p.average_glucose, p.a1c_estimate, p.in_range_percentage, p.total_readings
                );
                let _ = writeln!(out, "   joined {}", date(p.created_at));
            }
        }
        ViewMode::Table => {
            let _ = writeln!(
                out,
                "{:<36} {:<24} {:>8} {:>6} {:>8} {:>8} {:>10}",
                "LINE USER ID", "NAME", "AVG", "A1C", "IN RANGE", "READINGS", "JOINED"
            );
            for p in visible {
                let _ = writeln!(
                    out,
                    "{:<36} {:<24} {:>8.0} {:>6.1} {:>7.0}% {:>8} {:>10}",
                    p.line_user_id,
                    p.display_name,
                    p.average_glucose,
                    p.a1c_estimate,
                    p.in_range_percentage,
                    p.total_readings,
                    date(p.created_at)
                );
            }
        }
        ViewMode::Analytics => {
            let t = summary.total;
            let _ = writeln!(out, "## Patients: {} ({} readings)", t, summary.total_readings);
            let _ = writeln!(out, "Mean glucose: {:.1} mg/dL", summary.mean_glucose);
            share(&mut out, "High risk", summary.high_risk, t);
            let _ = writeln!(out, "\n## A1C bands");
            share(&mut out, "- normal", summary.a1c.normal, t);
            share(&mut out, "- prediabetes", summary.a1c.prediabetes, t);
            share(&mut out, "- diabetes", summary.a1c.diabetes, t);
            let _ = writeln!(out, "\n## Glucose control");
            share(&mut out, "- good", summary.control.good, t);
            share(&mut out, "- fair", summary.control.fair, t);
            share(&mut out, "- poor", summary.control.poor, t);
        }
    }
    out
}

pub fn patient_detail(stats: &PatientStats, readings: &[GlucoseReading]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Readings: {} total, {} in the last 7 days",
        stats.total_readings, stats.readings_last_7_days
    );
    let _ = writeln!(
        out,
        "Glucose: avg {:.0} / min {:.0} / max {:.0} mg/dL",
        stats.average_glucose, stats.min_glucose, stats.max_glucose
    );
    let _ = writeln!(
        out,
        "A1C estimate {:.1}% | in range {:.0}%",
        stats.a1c_estimate, stats.in_range_percentage
    );
    if !readings.is_empty() {
        let _ = writeln!(out, "\nRecent DTX readings:");
        for r in readings {
            let _ = writeln!(
                out,
                "- {} {:>5.0} mg/dL {}",
                r.measured_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into()),
                r.value,
                r.meal_context.as_deref().unwrap_or("")
            );
        }
    }
    out
}

pub fn recommendation(r: &HealthRecommendation) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Recommendation {} for {} ({})",
        r.id,
        r.user_id,
        date(r.created_at)
    );
    let _ = writeln!(
        out,
        "Risk {} | confidence {:.0}% | trend {}",
        r.risk_level,
        r.confidence_score * 100.0,
        if r.trend.is_empty() { "-" } else { r.trend.as_str() }
    );
    let d = &r.dtx_summary;
    let _ = writeln!(
        out,
        "DTX avg {:.0} (min {:.0}, max {:.0}) over {} readings | A1C {:.1}%",
        d.average, d.min, d.max, d.count, r.a1c_level
    );
    for (label, text) in [
        ("Glucose", &r.glucose_recommendation),
        ("Lifestyle", &r.lifestyle_recommendation),
        ("Medication", &r.medication_recommendation),
        ("Diet", &r.diet_recommendation),
        ("Exercise", &r.exercise_recommendation),
        ("Monitoring", &r.monitoring_recommendation),
    ] {
        if !text.trim().is_empty() {
            let _ = writeln!(out, "\n## {}\n{}", label, text.trim());
        }
    }
    if !r.risk_factors.is_empty() {
        let _ = writeln!(out, "\n## Risk factors");
        for f in &r.risk_factors {
            let _ = writeln!(out, "- {}", f);
        }
    }
    out
}

pub fn recommendations(
    mode: ViewMode,
    list: &[HealthRecommendation],
    summary: &RecommendationSummary,
) -> String {
    let mut out = String::new();
    match mode {
        ViewMode::Cards => {
            if list.is_empty() {
                let _ = writeln!(out, "No recommendations match the current filters.");
            }
            for (i, r) in list.iter().enumerate() {
                if i > 0 {
                    let _ = writeln!(out, "\n---\n");
                }
                out.push_str(&recommendation(r));
            }
        }
        ViewMode::Table => {
            let _ = writeln!(
                out,
                "{:<12} {:<36} {:<8} {:>6} {}",
                "CREATED", "PATIENT", "RISK", "CONF", "TREND"
            );
            for r in list {
                let _ = writeln!(
                    out,
                    "{:<12} {:<36} {:<8} {:>5.0}% {}",
                    date(r.created_at),
                    r.user_id,
                    r.risk_level,
                    r.confidence_score * 100.0,
                    r.trend
                );
            }
        }
        ViewMode::Analytics => {
            let _ = writeln!(
                out,
                "## Recommendations: {}, mean confidence {:.0}%",
                summary.total,
                summary.mean_confidence * 100.0
            );
            for (risk, count) in &summary.by_risk {
                share(&mut out, &format!("- {}", risk), *count, summary.total);
            }
        }
    }
    out
}

pub fn settings(s: &BotSettings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Channel ID:           {}", s.channel_id);
    let _ = writeln!(out, "Channel secret:       {}", mask(&s.channel_secret));
    let _ = writeln!(out, "Channel access token: {}", mask(&s.channel_access_token));
    let _ = writeln!(out, "Webhook URL:          {}", s.webhook_url);
    let _ = writeln!(out, "Login channel ID:     {}", s.login_channel_id);
    let _ = writeln!(out, "Login channel secret: {}", mask(&s.login_channel_secret));
    let _ = writeln!(out, "Login callback URL:   {}", s.login_callback_url);
    let _ = writeln!(out, "LIFF apps:            {}", s.liff_app_ids.join(", "));
    let _ = writeln!(out, "Rate limit / minute:  {}", s.rate_limit_per_minute);
    let _ = writeln!(
        out,
        "Quick replies:        {}",
        if s.quick_replies_enabled { s.quick_replies.join(" | ") } else { "disabled".into() }
    );
    out
}

pub fn bot_profile(p: &BotProfile) -> String {
    format!(
        "{} (@{})\nuser id: {}\nchat mode: {} | mark-as-read: {}\n",
        p.display_name, p.basic_id, p.user_id, p.chat_mode, p.mark_as_read_mode
    )
}

pub fn liff_apps(apps: &[LiffApp]) -> String {
    let mut out = String::new();
    if apps.is_empty() {
        let _ = writeln!(out, "No LIFF apps registered.");
    }
    for a in apps {
        let _ = writeln!(out, "{:<28} {:<8} {} {}", a.liff_id, a.view_type, a.url, a.description);
    }
    out
}

pub fn insights(i: &LineInsights) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## LINE insights {} ({})", i.date, i.status);
    let _ = writeln!(out, "Followers: {}", i.followers);
    let _ = writeln!(out, "Targeted reaches: {}", i.targeted_reaches);
    let _ = writeln!(
        out,
        "Blocks: {} ({:.1}% of followers)",
        i.blocks,
        percentage(i.blocks, i.followers)
    );
    let _ = writeln!(out, "Messages delivered: {}", i.total_deliveries());
    for (kind, count) in &i.deliveries {
        let _ = writeln!(out, "- {}: {}", kind, count);
    }
    out
}

pub fn flows(list: &[FollowEventFlow]) -> String {
    let mut out = String::new();
    if list.is_empty() {
        let _ = writeln!(out, "No follow flows configured.");
    }
    for f in list {
        let _ = writeln!(
            out,
            "[{}] {} {} ({} steps, consent {}, profile {})",
            f.id,
            if f.is_active { "*" } else { " " },
            f.name,
            f.steps.len(),
            if f.consent.required { "required" } else { "off" },
            if f.profile_collection.enabled { "on" } else { "off" }
        );
        for (i, s) in f.steps.iter().enumerate() {
            let _ = writeln!(
                out,
                "    {}. {:<12} +{}s {}",
                i + 1,
                s.step_type.as_str(),
                s.delay_seconds,
                s.content
            );
        }
    }
    out
}

pub fn dry_run(r: &FollowEventDryRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", if r.success { "OK" } else { "FAILED" }, r.message);
    for (i, m) in r.messages.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, m);
    }
    out
}

pub fn followers(
    mode: ViewMode,
    page: &FollowerPage,
    visible: &[LineFollower],
    summary: &FollowerSummary,
) -> String {
    let mut out = String::new();
    match mode {
        ViewMode::Analytics => {
            let _ = writeln!(out, "## Followers on this page: {}", summary.total);
            for (status, count) in &summary.by_status {
                let _ = writeln!(out, "- {}: {}", status, count);
            }
            let _ = writeln!(out, "Active: {:.1}%", summary.active_percentage);
            let _ = writeln!(
                out,
                "Messages: {} | interactions: {}",
                summary.total_messages, summary.total_interactions
            );
        }
        ViewMode::Cards => {
            if visible.is_empty() {
                let _ = writeln!(out, "No followers match the current filters.");
            }
            for f in visible {
                let _ = writeln!(out, "== {} [{}]", f.display_name, f.status);
                let _ = writeln!(out, "   {}", f.line_user_id);
                if !f.status_message.trim().is_empty() {
                    let _ = writeln!(out, "   \"{}\"", f.status_message.trim());
                }
                let _ = writeln!(
                    out,
                    "   followed {} | last seen {}",
                    date(f.followed_at),
                    date(f.last_interaction_at)
                );
                let _ = writeln!(
                    out,
                    "   {} messages | {} interactions",
                    f.message_count, f.interaction_count
                );
            }
        }
        ViewMode::Table => {
            let _ = writeln!(
                out,
                "{:<36} {:<24} {:<10} {:>6} {:>6} {}",
                "LINE USER ID", "NAME", "STATUS", "MSGS", "ACTS", "LAST SEEN"
            );
            for f in visible {
                let _ = writeln!(
                    out,
                    "{:<36} {:<24} {:<10} {:>6} {:>6} {}",
                    f.line_user_id,
                    f.display_name,
                    f.status,
                    f.message_count,
                    f.interaction_count,
                    date(f.last_interaction_at.or(f.followed_at))
                );
            }
        }
    }
    let _ = writeln!(
        out,
        "\npage {} of {} ({} followers total, {} shown)",
        page.page,
        page.total_pages().max(1),
        page.total,
        visible.len()
    );
    out
}
