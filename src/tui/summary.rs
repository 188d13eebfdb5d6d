use crate::models::LaneMetrics;

const NAME_WIDTH: usize = 21;

/// Box table comparing finished lanes. Lanes without metrics are skipped.
pub fn render_summary<'a, I>(results: I) -> String
where
    I: IntoIterator<Item = Option<&'a LaneMetrics>>,
{
    let mut out = String::new();
    out.push('\n');
    out.push_str("┌───────────────────────┬──────────┬────────────┬─────────────┬───────────┐\n");
    out.push_str("│ Model                 │ Time     │ Tokens I/O │ Cost        │ Provider  │\n");
    out.push_str("├───────────────────────┼──────────┼────────────┼─────────────┼───────────┤\n");

    for m in results.into_iter().flatten() {
        let name: String = m.name.chars().take(NAME_WIDTH).collect();
        let time = format!("{:.1}s", m.duration.as_secs_f64());
        let tokens = format!("{}/{}", m.usage.input_tokens, m.usage.output_tokens);
        let cost = format!("${:.6}", m.total_cost());
        out.push_str(&format!(
            "│ {:<21} │ {:<8} │ {:<10} │ {:<11} │ {:<9} │\n",
            name, time, tokens, cost, m.provider
        ));
    }

    out.push_str("└───────────────────────┴──────────┴────────────┴─────────────┴───────────┘\n");
    out
}
