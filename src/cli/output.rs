use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{AggregatedMetrics, BuildReport, OutputFormat, SearchResponse, StoreInfo};

pub trait Formatter {
    fn format_search_response(&self, response: &SearchResponse) -> String;
    fn format_build_report(&self, report: &BuildReport) -> String;
    fn format_store_info(&self, info: &StoreInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

pub struct TextFormatter;

impl TextFormatter {
    fn write_aggregate(output: &mut String, agg: &AggregatedMetrics) {
        writeln!(output, "Aggregate").unwrap();
        writeln!(output, "---------").unwrap();
        writeln!(output, "Opportunity score: {:.1}", agg.opportunity_score).unwrap();
        writeln!(output, "Avg volume:        {:.0}", agg.avg_volume).unwrap();
        writeln!(output, "Growth 3m / YoY:   {:.1}% / {:.1}%", agg.avg_growth_3m, agg.avg_growth_yoy).unwrap();
        writeln!(output, "Competition:       {:.2}", agg.avg_competition).unwrap();
        writeln!(output, "CPC / top bid:     {:.2} / {:.2}", agg.avg_cpc, agg.avg_top_page_bid).unwrap();
        writeln!(output, "Volatility:        {:.3}", agg.volatility).unwrap();
        writeln!(output, "Trend strength:    {:.3}", agg.trend_strength).unwrap();
        writeln!(output, "Bid efficiency:    {:.1}", agg.bid_efficiency).unwrap();
        writeln!(output, "TAC / SAC:         {:.0} / {:.0}", agg.tac, agg.sac).unwrap();

        if !agg.monthly_trend.is_empty() {
            writeln!(output, "\nMonthly trend").unwrap();
            for point in &agg.monthly_trend {
                writeln!(output, "  {}  {:>10}", point.month, point.volume).unwrap();
            }
        }
    }
}

impl Formatter for TextFormatter {
    fn format_search_response(&self, response: &SearchResponse) -> String {
        if response.is_empty() {
            return format!("No matches found for: {}\n", response.query);
        }

        let mut output = String::new();
        writeln!(output, "Matches for: \"{}\"", response.query).unwrap();
        writeln!(
            output,
            "Found {} keywords in {}ms\n",
            response.len(),
            response.duration_ms
        )
        .unwrap();

        for (i, m) in response.matches.iter().enumerate() {
            writeln!(output, "{:>3}. {} [Similarity: {:.3}]", i + 1, m.keyword, m.similarity).unwrap();
            writeln!(
                output,
                "     volume {}  competition {}  cpc {}  growth {} / {}",
                opt(m.metrics.avg_volume(), 0),
                opt(m.metrics.competition, 2),
                opt(m.metrics.cpc, 2),
                opt(m.metrics.growth_3m_pct, 1),
                opt(m.metrics.growth_yoy_pct, 1),
            )
            .unwrap();
        }
        writeln!(output).unwrap();

        Self::write_aggregate(&mut output, &response.aggregated);
        output
    }

    fn format_build_report(&self, report: &BuildReport) -> String {
        let mut output = String::new();
        writeln!(output, "Build Complete").unwrap();
        writeln!(output, "--------------").unwrap();
        writeln!(output, "Generation: {}", report.generation).unwrap();
        writeln!(output, "Keywords:   {}", report.total_keywords).unwrap();
        writeln!(output, "Chunks:     {} (size {})", report.chunks, report.chunk_size).unwrap();
        writeln!(output, "Model:      {} ({}d)", report.model_id, report.embedding_dimensions).unwrap();
        if !report.pruned_generations.is_empty() {
            writeln!(output, "Pruned:     {}", report.pruned_generations.join(", ")).unwrap();
        }
        writeln!(output, "Duration:   {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_store_info(&self, info: &StoreInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Store").unwrap();
        writeln!(output, "-----").unwrap();
        if let Some(ref generation) = info.generation {
            writeln!(output, "Generation:  {generation}").unwrap();
        }
        writeln!(output, "Model:       {}", info.model_id).unwrap();
        writeln!(output, "Keywords:    {}", info.total_keywords).unwrap();
        writeln!(output, "Chunks:      {} (size {})", info.chunks, info.chunk_size).unwrap();
        writeln!(output, "Dimensions:  {}", info.embedding_dimensions).unwrap();
        writeln!(output, "Created:     {}", info.created_at).unwrap();
        if let Some(ref checksum) = info.corpus_checksum {
            writeln!(output, "Corpus:      sha256:{}", &checksum[..checksum.len().min(16)]).unwrap();
        }
        if info.renormalized_vectors > 0 {
            writeln!(output, "Re-normalized vectors: {}", info.renormalized_vectors).unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_response(&self, response: &SearchResponse) -> String {
        self.render(response)
    }

    fn format_build_report(&self, report: &BuildReport) -> String {
        self.render(report)
    }

    fn format_store_info(&self, info: &StoreInfo) -> String {
        self.render(info)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_response(&self, response: &SearchResponse) -> String {
        if response.is_empty() {
            return format!("## No matches found\n\nQuery: `{}`\n", response.query);
        }

        let mut output = String::new();
        writeln!(output, "## Keyword Matches\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", response.query).unwrap();
        writeln!(
            output,
            "Found {} keywords in {}ms\n",
            response.len(),
            response.duration_ms
        )
        .unwrap();

        writeln!(output, "| # | Keyword | Similarity | Volume | Competition | CPC |").unwrap();
        writeln!(output, "|---|---------|------------|--------|-------------|-----|").unwrap();
        for (i, m) in response.matches.iter().enumerate() {
            writeln!(
                output,
                "| {} | {} | {:.3} | {} | {} | {} |",
                i + 1,
                m.keyword,
                m.similarity,
                opt(m.metrics.avg_volume(), 0),
                opt(m.metrics.competition, 2),
                opt(m.metrics.cpc, 2),
            )
            .unwrap();
        }

        let agg = &response.aggregated;
        writeln!(output, "\n### Aggregate\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Opportunity score | {:.1} |", agg.opportunity_score).unwrap();
        writeln!(output, "| Avg volume | {:.0} |", agg.avg_volume).unwrap();
        writeln!(output, "| Growth 3m | {:.1}% |", agg.avg_growth_3m).unwrap();
        writeln!(output, "| Growth YoY | {:.1}% |", agg.avg_growth_yoy).unwrap();
        writeln!(output, "| Competition | {:.2} |", agg.avg_competition).unwrap();
        writeln!(output, "| CPC | {:.2} |", agg.avg_cpc).unwrap();
        writeln!(output, "| Top of page bid | {:.2} |", agg.avg_top_page_bid).unwrap();
        writeln!(output, "| Volatility | {:.3} |", agg.volatility).unwrap();
        writeln!(output, "| Trend strength | {:.3} |", agg.trend_strength).unwrap();
        writeln!(output, "| Bid efficiency | {:.1} |", agg.bid_efficiency).unwrap();
        writeln!(output, "| TAC | {:.0} |", agg.tac).unwrap();
        writeln!(output, "| SAC | {:.0} |", agg.sac).unwrap();

        if !agg.monthly_trend.is_empty() {
            writeln!(output, "\n### Monthly Trend\n").unwrap();
            writeln!(output, "| Month | Volume |").unwrap();
            writeln!(output, "|-------|--------|").unwrap();
            for point in &agg.monthly_trend {
                writeln!(output, "| {} | {} |", point.month, point.volume).unwrap();
            }
        }
        output
    }

    fn format_build_report(&self, report: &BuildReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Build Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Generation | `{}` |", report.generation).unwrap();
        writeln!(output, "| Keywords | {} |", report.total_keywords).unwrap();
        writeln!(output, "| Chunks | {} |", report.chunks).unwrap();
        writeln!(output, "| Chunk size | {} |", report.chunk_size).unwrap();
        writeln!(output, "| Model | `{}` |", report.model_id).unwrap();
        writeln!(output, "| Duration | {}ms |", report.duration_ms).unwrap();
        output
    }

    fn format_store_info(&self, info: &StoreInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Store\n").unwrap();
        if let Some(ref generation) = info.generation {
            writeln!(output, "- **Generation:** `{generation}`").unwrap();
        }
        writeln!(output, "- **Model:** `{}`", info.model_id).unwrap();
        writeln!(output, "- **Keywords:** {}", info.total_keywords).unwrap();
        writeln!(output, "- **Chunks:** {} (size {})", info.chunks, info.chunk_size).unwrap();
        writeln!(output, "- **Dimensions:** {}", info.embedding_dimensions).unwrap();
        writeln!(output, "- **Created:** {}", info.created_at).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
