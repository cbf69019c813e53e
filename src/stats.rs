//! Statistics screens.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};

use crate::storage::{Database, DetailedStatistics, StorageError, UserCounts};

/// Days covered by the growth chart.
pub const GROWTH_CHART_DAYS: u32 = 14;

/// Longest bar in the growth chart, in `#` characters (roughly).
const CHART_WIDTH: usize = 20;

/// Shown instead of a chart when nobody joined recently.
pub const EMPTY_CHART_TEXT: &str = "So'nggi kunlarda yangi foydalanuvchilar qo'shilmagan.";

/// Counters plus the growth chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsOverview {
    pub counts: UserCounts,
    pub growth_chart: String,
}

impl StatsOverview {
    /// Collects the overview for the last `days` days.
    pub async fn load(db: &Database, days: u32) -> Result<Self, StorageError> {
        let counts = db.user_counts().await?;
        let join_days = db.join_days(days).await?;
        Ok(Self {
            counts,
            growth_chart: build_growth_chart(&join_days),
        })
    }

    /// HTML message for the statistics button.
    #[must_use]
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let c = &self.counts;
        format!(
            "📊 <b>BOT STATISTIKASI</b>\n{}\n\n\
             👥 <b>Foydalanuvchilar:</b>\n\
             \u{20}  • Jami: <code>{}</code>\n\
             \u{20}  • Bugun faol: <code>{}</code>\n\
             \u{20}  • Haftalik faol: <code>{}</code>\n\
             \u{20}  • Oylik faol: <code>{}</code>\n\n\
             📥 <b>Yuklab olishlar:</b>\n\
             \u{20}  • Jami: <code>{}</code>\n\n\
             📈 <b>O'sish (so'nggi kunlar):</b>\n<pre>{}</pre>\n\n\
             ⏰ <b>Yangilangan:</b> {}",
            "=".repeat(30),
            group_thousands(c.total_users),
            group_thousands(c.active_today),
            group_thousands(c.active_week),
            group_thousands(c.active_month),
            group_thousands(c.total_downloads),
            v_htmlescape::escape(&self.growth_chart),
            now.format("%d.%m.%Y %H:%M"),
        )
    }
}

/// One `YYYY-MM-DD | ### (n)` line per day with at least one join.
///
/// Bars are scaled so the busiest day is about twenty characters wide; every
/// listed day gets at least one `#`.
#[must_use]
pub fn build_growth_chart(join_days: &[NaiveDate]) -> String {
    if join_days.is_empty() {
        return EMPTY_CHART_TEXT.to_owned();
    }

    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for day in join_days {
        *per_day.entry(*day).or_default() += 1;
    }

    let max_count = per_day.values().copied().max().unwrap_or(1);
    let scale = (max_count / CHART_WIDTH).max(1);

    per_day
        .iter()
        .map(|(day, count)| {
            let bars = "#".repeat((count / scale).max(1));
            format!("{day} | {bars} ({count})")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `12345` → `12,345`.
#[must_use]
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        grouped.insert(0, '-');
    }
    grouped
}

/// HTML message for the detailed statistics view.
#[must_use]
pub fn render_detailed(stats: &DetailedStatistics) -> String {
    let a = &stats.activity;
    let mut text = format!(
        "📊 <b>Batafsil statistika</b>\n\n\
         👥 Jami foydalanuvchilar: <code>{}</code>\n\
         📥 Jami yuklab olishlar: <code>{}</code>\n\
         📈 O'rtacha yuklab olish: <code>{:.1}</code>\n\n\
         🕒 <b>Faollik:</b>\n\
         • Bugun: {}\n• Kecha: {}\n• Hafta: {}\n• Oy: {}\n• 3 oy: {}\n",
        group_thousands(stats.total_users),
        group_thousands(stats.total_downloads),
        stats.avg_downloads,
        a.today,
        a.yesterday,
        a.week,
        a.month,
        a.three_months,
    );

    let new_users: i64 = stats.new_users_weekly.iter().map(|(_, n)| n).sum();
    let _ = write!(text, "\n🆕 So'nggi 7 kunda yangi: {new_users}\n");

    if let Some((hour, count)) = stats
        .hourly_activity
        .iter()
        .enumerate()
        .max_by_key(|(_, count)| **count)
        .filter(|(_, count)| **count > 0)
    {
        let _ = writeln!(text, "⏰ Eng faol soat: {hour:02}:00 ({count})");
    }

    if !stats.top_downloaders.is_empty() {
        text.push_str("\n🏆 <b>Eng faol yuklovchilar:</b>\n");
        for (index, user) in stats.top_downloaders.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. {} - {}",
                index + 1,
                v_htmlescape::escape(&user.display_name()),
                user.downloads_count
            );
        }
    }

    let _ = write!(
        text,
        "\n📅 Yangilangan: {}",
        stats.generated_at.format("%d.%m.%Y %H:%M")
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ActivityPeriods, UserRecord};

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_growth_chart_empty() {
        assert_eq!(build_growth_chart(&[]), EMPTY_CHART_TEXT);
    }

    #[test]
    fn test_growth_chart_groups_and_sorts() {
        let days = [day("2024-05-02"), day("2024-05-01"), day("2024-05-02")];
        assert_eq!(
            build_growth_chart(&days),
            "2024-05-01 | # (1)\n2024-05-02 | ## (2)"
        );
    }

    #[test]
    fn test_growth_chart_scales_large_days() {
        let mut days = vec![day("2024-05-01"); 100];
        days.push(day("2024-05-02"));
        let chart = build_growth_chart(&days);
        let lines: Vec<_> = chart.lines().collect();
        assert_eq!(lines[0], format!("2024-05-01 | {} (100)", "#".repeat(20)));
        assert_eq!(lines[1], "2024-05-02 | # (1)");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(group_thousands(-4200), "-4,200");
    }

    #[test]
    fn test_overview_render_escapes_chart() {
        let overview = StatsOverview {
            counts: UserCounts {
                total_users: 1500,
                ..UserCounts::default()
            },
            growth_chart: "a < b".into(),
        };
        let text = overview.render(Utc::now());
        assert!(text.contains("<code>1,500</code>"));
        assert!(text.contains("a &lt; b"));
    }

    #[test]
    fn test_render_detailed() {
        let mut hourly = [0; 24];
        hourly[14] = 3;
        let stats = DetailedStatistics {
            total_users: 10,
            total_downloads: 25,
            avg_downloads: 2.5,
            activity: ActivityPeriods {
                today: 2,
                ..ActivityPeriods::default()
            },
            daily_activity: Vec::new(),
            hourly_activity: hourly,
            new_users_weekly: vec![(day("2024-05-01"), 2), (day("2024-05-02"), 1)],
            top_downloaders: vec![UserRecord {
                user_id: 1,
                username: Some("ali".into()),
                first_name: None,
                join_date: None,
                last_active: None,
                downloads_count: 9,
            }],
            generated_at: Utc::now(),
        };
        let text = render_detailed(&stats);
        assert!(text.contains("O'rtacha yuklab olish: <code>2.5</code>"));
        assert!(text.contains("So'nggi 7 kunda yangi: 3"));
        assert!(text.contains("Eng faol soat: 14:00 (3)"));
        assert!(text.contains("1. @ali - 9"));
    }
}
