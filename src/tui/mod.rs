//! Ratatui-based SED viewer.
//!
//! Shows the chart of a finished run next to the fitted parameters and the
//! instrument list. Nothing is re-fitted here; keys only change what is drawn.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Terminal,
};

use crate::app::{ChartOptions, RunOutput};
use crate::domain::SedType;
use crate::error::AppError;

mod plotters_chart;

use plotters_chart::SedPlottersChart;

/// Open the viewer on a finished run.
pub fn run(output: &RunOutput, options: ChartOptions) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::new(5, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(output, options);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(5, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(5, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App<'a> {
    output: &'a RunOutput,
    options: ChartOptions,
    selected: usize,
    status: String,
}

impl<'a> App<'a> {
    fn new(output: &'a RunOutput, mut options: ChartOptions) -> Self {
        options.instruments.resize(output.instruments.len(), true);
        Self {
            output,
            options,
            selected: 0,
            status: format!("{} instrument(s)", output.instruments.len()),
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(5, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(5, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(5, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply one key press; `true` means quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let n = self.output.instruments.len();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected + 1 < n {
                    self.selected += 1;
                }
            }
            KeyCode::Char(' ') => {
                if let Some(visible) = self.options.instruments.get_mut(self.selected) {
                    *visible = !*visible;
                    let label = &self.output.instruments[self.selected].label;
                    self.status = format!("{label}: {}", if *visible { "shown" } else { "hidden" });
                }
            }
            KeyCode::Char('s') => {
                self.options.sed_type = match self.options.sed_type {
                    SedType::Dnde => SedType::E2dnde,
                    SedType::E2dnde => SedType::Dnde,
                };
                self.status = format!("units: {}", self.options.sed_type.unit_label());
            }
            KeyCode::Char('b') => {
                self.options.band = !self.options.band;
                self.status = format!("error band: {}", on_off(self.options.band));
            }
            KeyCode::Char('m') => {
                self.options.model = !self.options.model;
                self.status = format!("joint model: {}", on_off(self.options.model));
            }
            KeyCode::Char('r') => {
                self.options.references = !self.options.references;
                self.status = format!("references: {}", on_off(self.options.references));
            }
            _ => {}
        }
        false
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let fit = &self.output.fit;
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("crab-sed", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" {} joint SED", self.output.model.name())),
        ]));
        lines.push(Line::from(Span::styled(
            format!(
                "datasets: {} | stat: {:.2} | iterations: {} | {}",
                self.output.datasets.len(),
                fit.total_stat,
                fit.n_iterations,
                if fit.success { "converged" } else { "not converged" },
            ),
            Style::default().fg(Color::Gray),
        )));

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(40)])
            .split(area);
        self.draw_chart(frame, chunks[0]);

        let side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(self.output.instruments.len() as u16 + 2),
                Constraint::Min(0),
            ])
            .split(chunks[1]);
        self.draw_instruments(frame, side[0]);
        self.draw_parameters(frame, side[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = format!("SED [{}]", self.options.sed_type.unit_label());
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let chart = self.output.sed_chart(&self.options);
        frame.render_widget(SedPlottersChart { chart: &chart }, inner);
    }

    fn draw_instruments(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .output
            .instruments
            .iter()
            .enumerate()
            .map(|(idx, inst)| {
                let [r, g, b] = inst.style.color;
                let mark = if self.options.instrument_visible(idx) { "[x]" } else { "[ ]" };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{mark} ")),
                    Span::styled(inst.label.clone(), Style::default().fg(Color::Rgb(r, g, b))),
                    Span::raw(format!(" {}/{}", inst.flux_points.n_successful(), inst.flux_points.len())),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Instruments").borders(Borders::ALL))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_parameters(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = self
            .output
            .fit
            .parameters
            .iter()
            .map(|p| {
                let text = if p.frozen {
                    format!("{:<10} {:>10.3e} (frozen)", p.name, p.value)
                } else {
                    format!("{:<10} {:>10.3e} ± {:.2e}", p.name, p.value, p.error)
                };
                Line::from(text)
            })
            .collect();

        if let Some(inst) = self.output.instruments.get(self.selected) {
            if let Some(refit) = &inst.refit {
                lines.push(Line::raw(""));
                lines.push(Line::styled(
                    format!("{} re-fit", inst.label),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                for p in refit.parameters.iter().filter(|p| !p.frozen) {
                    lines.push(Line::from(format!("{:<10} {:>10.3e} ± {:.2e}", p.name, p.value, p.error)));
                }
            }
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().title("Joint fit").borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  space show/hide  s units  m model  b band  r references  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::{run_analysis, simulate_inputs};
    use crate::data::InstrumentProfile;

    fn output() -> RunOutput {
        let (config, inputs) = simulate_inputs(&[InstrumentProfile::magic(), InstrumentProfile::lst()], 11).unwrap();
        run_analysis(&config, inputs).unwrap()
    }

    #[test]
    fn keys_change_chart_options() {
        let output = output();
        let mut app = App::new(&output, ChartOptions::new(SedType::E2dnde));
        assert_eq!(app.options.instruments, vec![true, true]);

        assert!(!app.handle_key(KeyCode::Down));
        assert!(!app.handle_key(KeyCode::Down));
        assert_eq!(app.selected, 1);
        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.options.instruments, vec![true, false]);

        app.handle_key(KeyCode::Char('s'));
        assert_eq!(app.options.sed_type, SedType::Dnde);
        app.handle_key(KeyCode::Char('b'));
        app.handle_key(KeyCode::Char('r'));
        assert!(!app.options.band && !app.options.references);

        let chart = output.sed_chart(&app.options);
        assert_eq!(chart.flux_points.len(), 1);
        assert!(app.handle_key(KeyCode::Char('q')));
    }
}
