use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::models::{IdType, Measurement, Metric, ALL_METRICS};
use crate::sites::{full_name_for, SiteListing};

/// Line colours, assigned to series by position.
pub const PALETTE: [&str; 10] = [
    "#636EFA", "#EF553B", "#00CC96", "#AB63FA", "#FFA15A",
    "#19D3F3", "#FF6692", "#B6E880", "#FF97FF", "#FECB52",
];

const PINNED_COLORS: [(&str, &str); 3] = [
    ("Blue River at Silverthorne Pavilion- 196", "#636EFA"),
    ("Snake River KSS- 52", "#EF553B"),
    ("Swan River Reach A- 1007", "#00CC96"),
];

/// Metrics for which an exact zero is drawn as a gap, like a NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapPolicy {
    zero_is_gap: BTreeSet<Metric>,
}

impl Default for GapPolicy {
    fn default() -> Self {
        GapPolicy::all()
    }
}

impl GapPolicy {
    pub fn all() -> Self {
        GapPolicy { zero_is_gap: ALL_METRICS.iter().copied().collect() }
    }

    pub fn none() -> Self {
        GapPolicy { zero_is_gap: BTreeSet::new() }
    }

    /// `all`, `none` or a comma separated list of metric keys.
    pub fn parse(value: &str) -> Result<GapPolicy, String> {
        match value.trim().to_lowercase().as_str() {
            "all" => return Ok(GapPolicy::all()),
            "none" | "" => return Ok(GapPolicy::none()),
            _ => {}
        }

        let mut zero_is_gap = BTreeSet::new();
        for key in value.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()) {
            let metric = Metric::from_key(&key.to_lowercase())
                .ok_or_else(|| format!("unknown metric '{}'", key))?;
            zero_is_gap.insert(metric);
        }
        Ok(GapPolicy { zero_is_gap })
    }

    pub fn is_gap(&self, metric: Metric, value: Option<f64>) -> bool {
        match value {
            None => true,
            Some(x) if !x.is_finite() => true,
            Some(x) => x == 0.0 && self.zero_is_gap.contains(&metric),
        }
    }

    pub fn zero_gap_metrics(&self) -> Vec<Metric> {
        self.zero_is_gap.iter().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, juniper::GraphQLObject)]
#[graphql(description = "A sample, a null value is a break in the line")]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
    pub record_id: IdType,
}

#[derive(Debug, Clone, PartialEq, juniper::GraphQLObject)]
pub struct Series {
    /// Full site name.
    pub site: String,
    /// Legend label, the site short name.
    pub label: String,
    pub color: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, juniper::GraphQLObject)]
pub struct Chart {
    pub metric: Metric,
    pub title: String,
    pub y_label: String,
    pub series: Vec<Series>,
    /// Points can be clicked to pick a record (admins only).
    pub selectable: bool,
}

/// Full names of the sites present in `records`, registry order first, then unknown sites by name.
/// Both spellings of a legacy site collapse into one entry.
fn ordered_sites(records: &[Measurement], listing: &SiteListing) -> Vec<String> {
    let mut sites: Vec<String> = records.iter()
        .map(|x| full_name_for(&x.site))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    sites.sort_by_cached_key(|x| (listing.position(x).unwrap_or(usize::MAX), x.clone()));
    sites
}

/// The original three sites keep their historical colours, the others
/// take the remaining palette entries in order.
fn series_colors(sites: &[String]) -> Vec<&'static str> {
    let mut next = PINNED_COLORS.len();
    sites.iter()
        .map(|site| match PINNED_COLORS.iter().find(|(name, _)| *name == site.as_str()) {
            Some((_, color)) => *color,
            None => {
                let color = PALETTE[next % PALETTE.len()];
                next += 1;
                color
            }
        })
        .collect()
}

pub fn render_series(records: &[Measurement], metric: Metric, listing: &SiteListing, policy: &GapPolicy) -> Chart {
    let mut by_site: HashMap<String, Vec<&Measurement>> = HashMap::new();
    for record in records {
        by_site.entry(full_name_for(&record.site)).or_default().push(record);
    }

    let sites = ordered_sites(records, listing);
    let colors = series_colors(&sites);
    let series = sites.into_iter()
        .zip(colors)
        .map(|(site, color)| {
            let mut rows = by_site.remove(&site).unwrap_or_default();
            rows.sort_by_key(|x| (x.date, x.created_at, x.id));

            let points = rows.into_iter()
                .map(|x| {
                    let value = x.value(metric);
                    ChartPoint {
                        date: x.date,
                        value: if policy.is_gap(metric, value) { None } else { value },
                        record_id: x.id,
                    }
                })
                .collect();

            Series {
                label: listing.short_name_for(&site),
                site,
                color: color.to_string(),
                points,
            }
        })
        .collect();

    Chart {
        metric,
        title: format!("{} - All Sites", metric.title()),
        y_label: metric.title().to_string(),
        series,
        selectable: false,
    }
}

pub fn render_all(records: &[Measurement], listing: &SiteListing, policy: &GapPolicy) -> Vec<Chart> {
    ALL_METRICS.iter()
        .map(|metric| render_series(records, *metric, listing, policy))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointSelection {
    Single { site: String, date: NaiveDate },
    /// More than one site has data on the date, the user has to pick one.
    Ambiguous { date: NaiveDate, candidates: Vec<String> },
    NoData,
}

/// Resolves a clicked sample of the `metric` chart to a site.
/// Only plotted samples count, candidates are full site names.
pub fn identify_point(
    records: &[Measurement],
    metric: Metric,
    date: NaiveDate,
    listing: &SiteListing,
    policy: &GapPolicy,
) -> PointSelection {
    let same_day: Vec<Measurement> = records.iter()
        .filter(|x| x.date == date && !policy.is_gap(metric, x.value(metric)))
        .cloned()
        .collect();

    let mut candidates = ordered_sites(&same_day, listing);

    match candidates.len() {
        0 => PointSelection::NoData,
        1 => PointSelection::Single { site: candidates.remove(0), date },
        _ => PointSelection::Ambiguous { date, candidates },
    }
}
