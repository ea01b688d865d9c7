//! Drawing an [`SedChart`] with Plotters.
//!
//! [`draw_sed`] is generic over the drawing backend: the SVG writer and the
//! terminal viewer share it and differ only in their [`SedTheme`].

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::domain::{colors, MarkerKind};
use crate::error::AppError;
use crate::plot::sed::SedChart;

/// Default SVG canvas size in pixels.
pub const SVG_SIZE: (u32, u32) = (900, 640);

/// Backend-dependent presentation settings.
#[derive(Debug, Clone, Copy)]
pub struct SedTheme {
    pub background: RGBColor,
    pub foreground: RGBColor,
    pub font_size: u32,
    pub line_width: u32,
    pub marker_size: i32,
    pub margin: u32,
    pub x_label_area: u32,
    pub y_label_area: u32,
    /// Draw the error band as a filled polygon (otherwise only its edges).
    pub fill_band: bool,
    /// Use single-cell dots instead of shaped markers.
    pub pixel_markers: bool,
    pub mesh: bool,
    pub legend: bool,
}

impl SedTheme {
    pub fn svg() -> Self {
        Self {
            background: WHITE,
            foreground: BLACK,
            font_size: 16,
            line_width: 2,
            marker_size: 4,
            margin: 16,
            x_label_area: 48,
            y_label_area: 80,
            fill_band: true,
            pixel_markers: false,
            mesh: true,
            legend: true,
        }
    }

    /// Low-resolution settings for the terminal.
    ///
    /// `plotters-ratatui-backend` maps circle radii incorrectly, so markers
    /// are plain pixels there.
    pub fn terminal() -> Self {
        Self {
            background: BLACK,
            foreground: WHITE,
            font_size: 10,
            line_width: 1,
            marker_size: 1,
            margin: 1,
            x_label_area: 3,
            y_label_area: 8,
            fill_band: false,
            pixel_markers: true,
            mesh: false,
            legend: false,
        }
    }

    /// Map a series colour onto this theme (black becomes the foreground).
    pub fn color(&self, rgb: [u8; 3]) -> RGBColor {
        if rgb == colors::BLACK {
            self.foreground
        } else {
            RGBColor(rgb[0], rgb[1], rgb[2])
        }
    }
}

fn format_energy(v: f64) -> String {
    if v >= 1.0 { format!("{v:.0}") } else { format!("{v:.2}") }
}

/// Draw `chart` onto `root` with log-log axes.
///
/// Draw order: error band, reference curves, fitted model, then flux points
/// per instrument (bin-width bars, error bars, markers, upper-limit arrows).
pub fn draw_sed<DB>(
    root: &DrawingArea<DB, Shift>,
    chart: &SedChart,
    theme: &SedTheme,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>>
where
    DB: DrawingBackend,
{
    let [x0, x1] = chart.x_bounds();
    let [y0, y1] = chart.y_bounds();
    let fg = theme.foreground;

    let mut builder = ChartBuilder::on(root);
    builder
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area);
    if let Some(title) = &chart.title {
        builder.caption(title, ("sans-serif", theme.font_size + 4).into_font().color(&fg));
    }
    let mut ctx = builder.build_cartesian_2d((x0..x1).log_scale(), (y0..y1).log_scale())?;

    let fmt_x = |v: &f64| format_energy(*v);
    let fmt_y = |v: &f64| format!("{v:.0e}");
    let mut mesh = ctx.configure_mesh();
    mesh.x_desc("Energy [TeV]")
        .y_desc(chart.sed_type.axis_label())
        .x_labels(8)
        .y_labels(6)
        .x_label_formatter(&fmt_x)
        .y_label_formatter(&fmt_y)
        .label_style(("sans-serif", theme.font_size).into_font().color(&fg))
        .axis_style(&fg)
        .bold_line_style(&fg.mix(0.15))
        .light_line_style(&fg.mix(0.05));
    if !theme.mesh {
        mesh.disable_mesh();
    }
    mesh.draw()?;

    if let Some(band) = &chart.band {
        let color = theme.color(band.color);
        if theme.fill_band {
            ctx.draw_series(std::iter::once(Polygon::new(band.outline(), color.mix(band.alpha).filled())))?;
        } else {
            let edge = |pick: fn(&(f64, f64, f64)) -> f64| -> Vec<(f64, f64)> {
                band.points
                    .iter()
                    .map(|p| (p.0, pick(p)))
                    .filter(|&(_, y)| y > 0.0 && y.is_finite())
                    .collect()
            };
            ctx.draw_series(LineSeries::new(edge(|p| p.1), &color.mix(band.alpha)))?;
            ctx.draw_series(LineSeries::new(edge(|p| p.2), &color.mix(band.alpha)))?;
        }
    }

    for curve in chart.references.iter().chain(chart.model.iter()) {
        let style = theme.color(curve.color).stroke_width(theme.line_width);
        let points: Vec<(f64, f64)> = curve
            .points
            .iter()
            .copied()
            .filter(|&(_, y)| y > 0.0 && y.is_finite())
            .collect();
        let anno = if curve.dashed {
            ctx.draw_series(DashedLineSeries::new(points, 8, 5, style))?
        } else {
            ctx.draw_series(LineSeries::new(points, style))?
        };
        anno.label(curve.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    for series in &chart.flux_points {
        let style = theme.color(series.style.color).stroke_width(theme.line_width);
        let size = theme.marker_size;

        ctx.draw_series(series.markers.iter().map(|m| {
            let y = if m.is_ul { m.ul } else { m.value };
            ErrorBar::new_horizontal(y, m.e_min, m.e_ref, m.e_max, style, 0)
        }))?;
        ctx.draw_series(
            series
                .markers
                .iter()
                .filter(|m| !m.is_ul)
                .map(|m| ErrorBar::new_vertical(m.e_ref, m.y_low(), m.value, m.y_high(), style, 6)),
        )?;
        ctx.draw_series(series.markers.iter().filter(|m| m.is_ul).map(|m| {
            PathElement::new(vec![(m.e_ref, m.ul), (m.e_ref, m.ul * 0.5)], style)
        }))?;
        ctx.draw_series(series.markers.iter().filter(|m| m.is_ul).map(|m| {
            EmptyElement::at((m.e_ref, m.ul * 0.5)) + PathElement::new(vec![(-4, -6), (0, 0), (4, -6)], style)
        }))?;

        let at: Vec<(f64, f64)> = series
            .markers
            .iter()
            .filter(|m| !m.is_ul)
            .map(|m| (m.e_ref, m.value))
            .collect();
        let label = series.label.as_str();
        match (theme.pixel_markers, series.style.marker) {
            (true, _) => {
                ctx.draw_series(at.iter().map(|&p| Pixel::new(p, style)))?
                    .label(label)
                    .legend(move |(x, y)| Pixel::new((x + 10, y), style));
            }
            (false, MarkerKind::Circle) => {
                ctx.draw_series(at.iter().map(|&p| Circle::new(p, size, style.filled())))?
                    .label(label)
                    .legend(move |(x, y)| Circle::new((x + 10, y), size, style.filled()));
            }
            (false, MarkerKind::Square) => {
                ctx.draw_series(
                    at.iter()
                        .map(|&p| EmptyElement::at(p) + Rectangle::new([(-size, -size), (size, size)], style.filled())),
                )?
                .label(label)
                .legend(move |(x, y)| Rectangle::new([(x + 10 - size, y - size), (x + 10 + size, y + size)], style.filled()));
            }
            (false, MarkerKind::Triangle) => {
                ctx.draw_series(at.iter().map(|&p| TriangleMarker::new(p, size + 1, style.filled())))?
                    .label(label)
                    .legend(move |(x, y)| TriangleMarker::new((x + 10, y), size + 1, style.filled()));
            }
            (false, MarkerKind::Cross) => {
                ctx.draw_series(at.iter().map(|&p| Cross::new(p, size, style)))?
                    .label(label)
                    .legend(move |(x, y)| Cross::new((x + 10, y), size, style));
            }
        }
    }

    if theme.legend {
        ctx.configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .background_style(&theme.background.mix(0.85))
            .border_style(&fg)
            .label_font(("sans-serif", theme.font_size).into_font().color(&fg))
            .draw()?;
    }

    Ok(())
}

fn render<DB>(
    root: &DrawingArea<DB, Shift>,
    chart: &SedChart,
    theme: &SedTheme,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>>
where
    DB: DrawingBackend,
{
    root.fill(&theme.background)?;
    draw_sed(root, chart, theme)?;
    root.present()?;
    Ok(())
}

/// Write `chart` as an SVG file.
pub fn write_svg(path: &Path, chart: &SedChart, size: (u32, u32)) -> Result<(), AppError> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    render(&root, chart, &SedTheme::svg())
        .map_err(|e| AppError::new(5, format!("Failed to render SED to {}: {e}", path.display())))
}

/// Render `chart` into an in-memory SVG document.
pub fn render_svg_string(chart: &SedChart, size: (u32, u32)) -> Result<String, AppError> {
    let mut out = String::new();
    {
        let root = SVGBackend::with_string(&mut out, size).into_drawing_area();
        render(&root, chart, &SedTheme::svg()).map_err(|e| AppError::new(5, format!("Failed to render SED: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::sed::{PointSeries, SedMarker};
    use crate::domain::{EnergyRange, SedType, SeriesStyle};
    use crate::models::{default_references, ModelCovariance, SpectralModel};

    fn chart() -> SedChart {
        let range = EnergyRange::new(0.05, 30.0).unwrap();
        let mut model = SpectralModel::log_parabola(3e-11, 1.0, 2.5, 0.1);
        model.covariance = Some(ModelCovariance {
            indices: vec![0, 2],
            matrix: vec![vec![1e-24, 0.0], vec![0.0, 1e-3]],
        });
        SedChart::new(SedType::E2dnde, range)
            .with_title("Crab Nebula")
            .with_references(&default_references(range))
            .with_model("Joint fit", &model, colors::GRAY)
    }

    #[test]
    fn svg_contains_legend_labels() {
        let svg = render_svg_string(&chart(), SVG_SIZE).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Meyer et al. (2010)"));
        assert!(svg.contains("Joint fit"));
        assert!(svg.contains("polygon"));
    }

    #[test]
    fn every_marker_shape_renders_with_upper_limits() {
        let kinds = [MarkerKind::Circle, MarkerKind::Square, MarkerKind::Triangle, MarkerKind::Cross];
        let mut chart = chart();
        for (i, kind) in kinds.into_iter().enumerate() {
            let scale = 1.0 + i as f64;
            let point = SedMarker {
                e_ref: 1.0 * scale,
                e_min: 0.8 * scale,
                e_max: 1.25 * scale,
                value: 4e-11,
                errn: 4e-12,
                errp: 5e-12,
                is_ul: false,
                ul: f64::NAN,
            };
            let limit = SedMarker {
                e_ref: 12.0,
                is_ul: true,
                ul: 2e-12,
                ..point
            };
            chart.flux_points.push(PointSeries {
                label: format!("series {i}"),
                style: SeriesStyle::new(colors::DODGERBLUE, kind),
                markers: vec![point, limit],
            });
        }

        let svg = render_svg_string(&chart, SVG_SIZE).unwrap();
        for i in 0..kinds.len() {
            assert!(svg.contains(&format!("series {i}")));
        }
    }

    #[test]
    fn write_svg_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sed.svg");
        write_svg(&path, &chart(), (400, 300)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Energy [TeV]"));
    }

    #[test]
    fn terminal_theme_remaps_black() {
        let theme = SedTheme::terminal();
        assert_eq!(theme.color(colors::BLACK), WHITE);
        assert_eq!(theme.color(colors::TEAL), RGBColor(0, 128, 128));
    }
}
