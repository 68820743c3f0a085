use std::io::Write;
use std::str::FromStr;

use aula_core::{PredictionResult, Recommendations};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: table, json"
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationReport<'a> {
    query: &'a str,
    related_courses: &'a Recommendations,
    related_topics: &'a Recommendations,
    related_resources: &'a Recommendations,
}

/// The three lists produced for one live query.
#[derive(Debug, Clone, Copy)]
pub struct RelatedLists<'a> {
    pub courses: &'a Recommendations,
    pub topics: &'a Recommendations,
    pub resources: &'a Recommendations,
}

pub fn write_predictions(
    predictions: &[PredictionResult],
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, predictions)?;
            writeln!(out)?;
        }
        OutputFormat::Table => {
            writeln!(
                out,
                "entity\tid\tname\tconfidence\tsearches\tmode\tfallback\treason"
            )?;
            for prediction in predictions {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{:.2}\t{}\t{}\t{}\t{}",
                    prediction.entity.as_str(),
                    optional_field(prediction.predicted_id),
                    normalize_field(prediction.predicted_name.as_deref().unwrap_or("-")),
                    prediction.confidence,
                    prediction.search_count,
                    prediction.mode_used.as_str(),
                    prediction.fallback_reason.as_deref().unwrap_or("-"),
                    normalize_field(&prediction.reason),
                )?;
            }
        }
    }
    Ok(())
}

pub fn write_recommendations(
    query: &str,
    lists: RelatedLists<'_>,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let report = RecommendationReport {
                query,
                related_courses: lists.courses,
                related_topics: lists.topics,
                related_resources: lists.resources,
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
        OutputFormat::Table => {
            writeln!(out, "list\ttype\tid\tname\tscore\tconfidence\tmode\tevidence")?;
            let sections = [
                ("courses", lists.courses),
                ("topics", lists.topics),
                ("resources", lists.resources),
            ];
            for (section, recommendations) in sections {
                for item in &recommendations.items {
                    writeln!(
                        out,
                        "{section}\t{}\t{}\t{}\t{:.1}\t{:.2}\t{}\t{}",
                        item.kind.as_str(),
                        optional_field(item.id),
                        normalize_field(&item.name),
                        item.score,
                        item.confidence,
                        recommendations.mode_used.as_str(),
                        normalize_field(&item.supporting_evidence.join(",")),
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn optional_field(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_owned(), |value| value.to_string())
}

fn normalize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}
