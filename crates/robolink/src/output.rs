//! Output formatting: table, JSON, YAML.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`
//! (or a hand-formatted detail view for single items), structured formats
//! use serde.

use std::io::{self, IsTerminal, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of items. `table` maps each item through `to_row`; the
/// structured formats serialize the original data.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        other => render_structured(other, data),
    }
}

/// Render a single item. `table` uses `detail_fn`.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        other => render_structured(other, data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", output.trim_end());
}

fn render_structured<T>(format: OutputFormat, data: &T) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    Ok(match format {
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Json | OutputFormat::Table => serde_json::to_string_pretty(data)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        name: &'static str,
        level: u8,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
    }

    #[test]
    fn list_renders_each_format() {
        let items = [Item { name: "pump", level: 2 }];
        let row = |item: &Item| Row {
            name: item.name.to_owned(),
        };

        let table = render_list(OutputFormat::Table, &items, row).unwrap();
        assert!(table.contains("Name") && table.contains("pump"));

        let compact = render_list(OutputFormat::JsonCompact, &items, row).unwrap();
        assert_eq!(compact, r#"[{"name":"pump","level":2}]"#);

        let yaml = render_list(OutputFormat::Yaml, &items, row).unwrap();
        assert!(yaml.contains("name: pump"));
    }

    #[test]
    fn single_table_uses_the_detail_view() {
        let item = Item { name: "vacuum", level: 1 };
        let out = render_single(OutputFormat::Table, &item, |i| format!("{}={}", i.name, i.level))
            .unwrap();
        assert_eq!(out, "vacuum=1");
    }
}
