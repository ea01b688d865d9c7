//! Plotters-powered SED chart widget for Ratatui.
//!
//! The chart is drawn by the same [`draw_sed`] used for SVG output, with the
//! terminal theme, and written into the Ratatui buffer through
//! `plotters-ratatui-backend`.

use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::plot::{draw_sed, SedChart, SedTheme};

/// Render-only wrapper; all series and bounds live in the [`SedChart`].
pub struct SedPlottersChart<'a> {
    pub chart: &'a SedChart,
}

impl<'a> Widget for SedPlottersChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters cannot lay out log axes in a handful of cells.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.chart.x_bounds();
        let [y0, y1] = self.chart.y_bounds();
        if !(x0 > 0.0 && y0 > 0.0 && x1 > x0 && y1 > y0 && x1.is_finite() && y1.is_finite()) {
            buf.set_string(area.x, area.y, "Nothing to draw.", Style::default().fg(Color::Yellow));
            return;
        }

        let chart = self.chart;
        let theme = SedTheme::terminal();
        let widget = widget_fn(move |root| draw_sed(&root, chart, &theme));

        widget.render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{colors, EnergyRange, SedType};
    use crate::models::{default_references, SpectralModel};

    #[test]
    fn chart_is_drawn_into_the_buffer() {
        let range = EnergyRange::new(0.05, 30.0).unwrap();
        let chart = SedChart::new(SedType::E2dnde, range)
            .with_references(&default_references(range))
            .with_model("Joint fit", &SpectralModel::meyer_crab(), colors::GRAY);

        let area = Rect::new(0, 0, 80, 24);
        let mut buf = Buffer::empty(area);
        SedPlottersChart { chart: &chart }.render(area, &mut buf);
        assert!(buf.content().iter().any(|cell| cell.symbol() != " "));
    }

    #[test]
    fn small_area_shows_a_hint() {
        let range = EnergyRange::new(0.05, 30.0).unwrap();
        let chart = SedChart::new(SedType::E2dnde, range);
        let area = Rect::new(0, 0, 10, 4);
        let mut buf = Buffer::empty(area);
        SedPlottersChart { chart: &chart }.render(area, &mut buf);
        assert_eq!(buf[(0, 0)].symbol(), "C");
    }
}
