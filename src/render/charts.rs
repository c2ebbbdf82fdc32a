//! PNG chart drawing with plotters.

use super::StackedBars;
use plotters::coord::combinators::WithKeyPoints;
use plotters::coord::ranged1d::{KeyPointHint, NoDefaultFormatting, ValueFormatter};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

pub type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

const FONT: &str = "sans-serif";
const SKY_BLUE: RGBColor = RGBColor(135, 206, 235);
const ORANGE: RGBColor = RGBColor(255, 165, 0);
const LINE_GREEN: RGBColor = RGBColor(34, 139, 34);

/// Colour for the bar series of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarColor {
    SkyBlue,
    Orange,
}

impl BarColor {
    fn rgb(&self) -> RGBColor {
        match self {
            BarColor::SkyBlue => SKY_BLUE,
            BarColor::Orange => ORANGE,
        }
    }
}

/// Axis titles and caption shared by the cartesian charts.
#[derive(Debug, Clone, Copy)]
pub struct Labels<'a> {
    pub title: &'a str,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
}

/// Palette colour for series `idx`, stable for a given index.
pub fn palette_color(idx: usize) -> RGBColor {
    let (r, g, b) = Palette99::pick(idx).rgb();
    RGBColor(r, g, b)
}

fn axis_max(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0_f64, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// X range with one unit-wide slot per label and nothing after the last.
fn slot_range(count: usize) -> Range<f64> {
    0.0..count as f64
}

/// Key-point x axis that plotters can format; delegates everything to the
/// inner range (`WithKeyPoints` alone does not implement `ValueFormatter`).
struct SlotAxis(WithKeyPoints<RangedCoordf64>);

impl From<WithKeyPoints<RangedCoordf64>> for SlotAxis {
    fn from(inner: WithKeyPoints<RangedCoordf64>) -> Self {
        SlotAxis(inner)
    }
}

impl Ranged for SlotAxis {
    type FormatOption = NoDefaultFormatting;
    type ValueType = f64;

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        self.0.map(value, limit)
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        self.0.key_points(hint)
    }

    fn range(&self) -> Range<f64> {
        self.0.range()
    }
}

impl ValueFormatter<f64> for SlotAxis {
    fn format(value: &f64) -> String {
        RangedCoordf64::format(value)
    }
}

/// Tick positions, one at the centre of every slot.
fn slot_centers(count: usize) -> Vec<f64> {
    (0..count).map(|i| i as f64 + 0.5).collect()
}

fn slot_label(x: f64, labels: &[String]) -> String {
    if x < 0.0 {
        return String::new();
    }
    labels.get(x.floor() as usize).cloned().unwrap_or_default()
}

/// Left and right edge of the bar drawn in slot `i`.
fn bar_edges(i: usize, gap: f64) -> (f64, f64) {
    (i as f64 + gap, i as f64 + 1.0 - gap)
}

/// One bar per label.
pub fn draw_bar_chart(
    path: &Path,
    size: (u32, u32),
    text: Labels<'_>,
    labels: &[String],
    values: &[f64],
    color: BarColor,
) -> DrawResult {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let x_axis: SlotAxis = slot_range(labels.len()).with_key_points(slot_centers(labels.len())).into();
    let mut chart = ChartBuilder::on(&root)
        .caption(text.title, (FONT, 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_axis, 0f64..axis_max(values.iter().copied()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|x| slot_label(*x, labels))
        .x_desc(text.x_desc)
        .y_desc(text.y_desc)
        .draw()?;

    let bar_color = color.rgb();
    chart.draw_series(values.iter().enumerate().map(|(i, v)| {
        let (left, right) = bar_edges(i, 0.1);
        Rectangle::new([(left, 0.0), (right, *v)], bar_color.filled())
    }))?;

    root.present()?;
    Ok(())
}

/// A line with point markers, one point per label in order.
pub fn draw_line_chart(
    path: &Path,
    size: (u32, u32),
    text: Labels<'_>,
    labels: &[String],
    values: &[f64],
) -> DrawResult {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let centers = slot_centers(labels.len());
    let x_axis: SlotAxis = slot_range(labels.len()).with_key_points(centers.clone()).into();
    let mut chart = ChartBuilder::on(&root)
        .caption(text.title, (FONT, 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_axis, 0f64..axis_max(values.iter().copied()))?;

    chart
        .configure_mesh()
        .x_label_formatter(&|x| slot_label(*x, labels))
        .x_desc(text.x_desc)
        .y_desc(text.y_desc)
        .draw()?;

    let points: Vec<(f64, f64)> = centers.into_iter().zip(values.iter().copied()).collect();

    chart.draw_series(LineSeries::new(points.clone(), LINE_GREEN.stroke_width(2)))?;
    chart.draw_series(
        points
            .into_iter()
            .map(|p| Circle::new(p, 4, LINE_GREEN.filled())),
    )?;

    root.present()?;
    Ok(())
}

/// A pie with one labelled slice per value.
pub fn draw_pie_chart(
    path: &Path,
    size: (u32, u32),
    title: &str,
    labels: &[String],
    values: &[f64],
) -> DrawResult {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let area = root.titled(title, (FONT, 24))?;

    let (width, height) = area.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = f64::from(width.min(height)) * 0.35;
    let colors: Vec<RGBColor> = (0..values.len()).map(palette_color).collect();

    let mut pie = Pie::new(&center, &radius, values, &colors, labels);
    pie.start_angle(90.0);
    pie.label_style((FONT, 14).into_font().color(&BLACK));
    pie.label_offset(20.0);
    area.draw(&pie)?;

    root.present()?;
    Ok(())
}

/// One bar per month with a segment per category, plus a legend.
pub fn draw_stacked_chart(
    path: &Path,
    size: (u32, u32),
    text: Labels<'_>,
    stacked: &StackedBars,
) -> DrawResult {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let months = stacked.months.len();
    let totals = (0..months).map(|m| stacked.month_total(m));
    let x_axis: SlotAxis = slot_range(months).with_key_points(slot_centers(months)).into();
    let mut chart = ChartBuilder::on(&root)
        .caption(text.title, (FONT, 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_axis, 0f64..axis_max(totals))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|x| slot_label(*x, &stacked.months))
        .x_desc(text.x_desc)
        .y_desc(text.y_desc)
        .draw()?;

    for (c, category) in stacked.categories.iter().enumerate() {
        let color = palette_color(c);
        let bars: Vec<Rectangle<(f64, f64)>> = (0..months)
            .map(|m| {
                let base = stacked.base_of(c, m);
                let top = base + stacked.values[c][m];
                let (left, right) = bar_edges(m, 0.15);
                Rectangle::new([(left, base), (right, top)], color.filled())
            })
            .collect();

        chart
            .draw_series(bars)?
            .label(category.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
