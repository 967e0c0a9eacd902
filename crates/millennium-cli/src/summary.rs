//! Tables printed by the `releases`, `components` and `uninstall` commands.

use chrono::{DateTime, Utc};
use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};

use millennium_installer::format::{format_bytes, format_optional_bytes, time_ago};
use millennium_installer::uninstall::reclaimed_space;
use millennium_installer::{Component, ComponentState, Platform, Release, ReleaseCatalog};

/// One row per release, newest first.
#[must_use]
pub fn releases_table(
    catalog: &ReleaseCatalog,
    product: &str,
    platform: &Platform,
    now: DateTime<Utc>,
) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Tag"),
        header_cell("Name"),
        header_cell("Channel"),
        header_cell("Published"),
        header_cell("Download"),
    ]);
    apply_table_style(&mut table);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(10)),
        ColumnConstraint::UpperBoundary(Width::Percentage(40)),
        ColumnConstraint::LowerBoundary(Width::Fixed(11)),
        ColumnConstraint::LowerBoundary(Width::Fixed(12)),
        ColumnConstraint::LowerBoundary(Width::Fixed(10)),
    ]);
    align_column(&mut table, 4, CellAlignment::Right);

    for release in catalog.releases().iter().filter(|release| !release.draft) {
        let download = release
            .find_asset(&platform.asset_name(product, &release.tag_name))
            .map(|asset| asset.size);
        table.add_row(vec![
            tag_cell(release, catalog.is_latest(&release.tag_name)),
            Cell::new(release.display_name()),
            channel_cell(release),
            published_cell(release.published_at, now),
            match download {
                Some(size) => Cell::new(format_bytes(size)),
                None => dim_cell("N/A"),
            },
        ]);
    }
    table
}

/// Installed components with their paths, sizes and uninstall state.
#[must_use]
pub fn components_table(components: &[Component]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell(""),
        header_cell("Component"),
        header_cell("Paths"),
        header_cell("Size"),
        header_cell("Status"),
    ]);
    apply_table_style(&mut table);
    table.set_constraints(vec![
        ColumnConstraint::UpperBoundary(Width::Fixed(3)),
        ColumnConstraint::LowerBoundary(Width::Fixed(12)),
        ColumnConstraint::UpperBoundary(Width::Percentage(50)),
        ColumnConstraint::LowerBoundary(Width::Fixed(10)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
    ]);
    align_column(&mut table, 0, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);

    for component in components {
        let paths = if component.paths.is_empty() {
            "not installed".to_string()
        } else {
            component
                .paths
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join("\n")
        };
        table.add_row(vec![
            Cell::new(if component.selected { "x" } else { "" }),
            Cell::new(&component.name).add_attribute(Attribute::Bold),
            if component.paths.is_empty() {
                dim_cell(paths)
            } else {
                Cell::new(paths)
            },
            Cell::new(format_bytes(component.total_size)),
            state_cell(&component.state),
        ]);
    }

    table.add_row(vec![
        dim_cell(""),
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("selected components"),
        Cell::new(format_bytes(reclaimed_space(components))).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    table
}

/// One line describing the release about to be installed.
#[must_use]
pub fn install_banner(release: &Release, install_size: Option<u64>) -> String {
    format!(
        "Installing Millennium {} ({} on disk)",
        release.tag_name,
        format_optional_bytes(install_size)
    )
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value.to_string())
        .fg(Color::DarkGrey)
        .add_attribute(Attribute::Dim)
}

fn tag_cell(release: &Release, is_latest: bool) -> Cell {
    if is_latest {
        Cell::new(format!("{} (latest)", release.tag_name))
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    } else {
        Cell::new(&release.tag_name)
    }
}

fn channel_cell(release: &Release) -> Cell {
    if release.prerelease {
        Cell::new("Pre-release").fg(Color::Yellow)
    } else {
        Cell::new("Stable")
    }
}

fn published_cell(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Cell {
    match published_at {
        Some(published) => Cell::new(time_ago(published, now)),
        None => dim_cell("unknown"),
    }
}

fn state_cell(state: &ComponentState) -> Cell {
    match state {
        ComponentState::Idle => dim_cell(state.label()),
        ComponentState::Uninstalling => Cell::new(state.label()).fg(Color::Yellow),
        ComponentState::Success => Cell::new(state.label()).fg(Color::Green),
        ComponentState::Failed(reason) => {
            Cell::new(format!("{}: {reason}", state.label())).fg(Color::Red)
        }
    }
}
