use chrono::{DateTime, Duration, NaiveDate, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: i64,
}

pub struct HeatmapCell {
    pub date: String,
    pub count: i64,
    pub color: String,
}

/// First day of a `days`-long window ending on `today`.
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(i64::from(days.max(1)) - 1)
}

/// Notes per UTC day over the window ending on `today`, oldest first and
/// zero-filled. Unparseable or out-of-window timestamps are ignored.
pub fn daily_counts<'a>(
    timestamps: impl IntoIterator<Item = &'a str>,
    today: NaiveDate,
    days: u32,
) -> Vec<DayCount> {
    let start = window_start(today, days);
    let mut counts: Vec<DayCount> = start
        .iter_days()
        .take_while(|date| *date <= today)
        .map(|date| DayCount { date, count: 0 })
        .collect();

    for timestamp in timestamps {
        let Ok(at) = DateTime::parse_from_rfc3339(timestamp) else {
            continue;
        };
        let date = at.with_timezone(&Utc).date_naive();
        if date < start || date > today {
            continue;
        }
        let index = (date - start).num_days() as usize;
        if let Some(day) = counts.get_mut(index) {
            day.count += 1;
        }
    }

    counts
}

// Light blue for quiet days up to dark blue for the busiest one.
const START_RGB: [f64; 3] = [227.0, 242.0, 253.0];
const END_RGB: [f64; 3] = [21.0, 101.0, 192.0];

fn color_for(intensity: f64) -> String {
    let channel = |i: usize| (START_RGB[i] + (END_RGB[i] - START_RGB[i]) * intensity).round();
    format!("rgb({:.0}, {:.0}, {:.0})", channel(0), channel(1), channel(2))
}

/// Lays the counts out in columns of seven days.
pub fn build_heatmap(counts: &[DayCount]) -> Vec<Vec<HeatmapCell>> {
    let max_count = counts.iter().map(|d| d.count).max().unwrap_or(0);

    let cells: Vec<HeatmapCell> = counts
        .iter()
        .map(|day| {
            let intensity = if max_count > 0 {
                day.count as f64 / max_count as f64
            } else {
                0.0
            };
            HeatmapCell {
                date: day.date.format("%Y-%m-%d").to_string(),
                count: day.count,
                color: color_for(intensity),
            }
        })
        .collect();

    let mut columns = Vec::new();
    let mut column = Vec::with_capacity(7);
    for cell in cells {
        column.push(cell);
        if column.len() == 7 {
            columns.push(std::mem::replace(&mut column, Vec::with_capacity(7)));
        }
    }
    if !column.is_empty() {
        columns.push(column);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn counts_are_zero_filled_and_oldest_first() {
        let today = day("2024-03-10");
        let counts = daily_counts(
            [
                "2024-03-10T08:00:00+00:00",
                "2024-03-10T23:59:59+00:00",
                "2024-03-08T12:00:00Z",
                "2024-01-01T00:00:00Z",
                "garbage",
            ],
            today,
            3,
        );

        assert_eq!(
            counts,
            vec![
                DayCount { date: day("2024-03-08"), count: 1 },
                DayCount { date: day("2024-03-09"), count: 0 },
                DayCount { date: day("2024-03-10"), count: 2 },
            ]
        );
    }

    #[test]
    fn timestamps_are_bucketed_by_utc_day() {
        let counts = daily_counts(["2024-03-10T01:00:00+08:00"], day("2024-03-10"), 2);
        assert_eq!(counts[0].count, 1);
        assert_eq!(counts[1].count, 0);
    }

    #[test]
    fn default_window_covers_twelve_weeks() {
        let counts = daily_counts(std::iter::empty(), day("2024-03-10"), 84);
        assert_eq!(counts.len(), 84);
        assert_eq!(counts[0].date, day("2023-12-18"));

        let heatmap = build_heatmap(&counts);
        assert_eq!(heatmap.len(), 12);
        assert!(heatmap.iter().all(|column| column.len() == 7));
    }

    #[test]
    fn colors_scale_with_busiest_day() {
        let counts = vec![
            DayCount { date: day("2024-03-09"), count: 0 },
            DayCount { date: day("2024-03-10"), count: 4 },
        ];
        let heatmap = build_heatmap(&counts);
        assert_eq!(heatmap[0][0].color, "rgb(227, 242, 253)");
        assert_eq!(heatmap[0][1].color, "rgb(21, 101, 192)");
        assert_eq!(heatmap[0][1].date, "2024-03-10");
    }

    #[test]
    fn empty_activity_is_all_light() {
        let counts = daily_counts(std::iter::empty(), day("2024-03-10"), 7);
        let heatmap = build_heatmap(&counts);
        assert!(heatmap[0].iter().all(|cell| cell.color == "rgb(227, 242, 253)"));
    }
}
