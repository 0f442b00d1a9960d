use std::{
    io::stdout,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use crate::decoder::{DecodedFrame, DisplayScale, FormatError};
use crate::grid::{Grid, Reading};
use crate::gui::error::GuiError;
use crate::sequence::FrameSequence;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// What the monitor saw before it was closed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewSummary {
    /// Frames drawn
    pub frames: u64,
    /// Frames that failed to decode
    pub rejected: u64,
    /// Frames known to be lost on the link
    pub missed: u64,
}

/// The colour of one cell on the display scale. Blue is no pressure, red is
/// full pressure, nodes without data are dark grey.
pub fn heat_color(reading: Reading, scale: &DisplayScale) -> Color {
    match reading {
        Reading::NoData => Color::DarkGray,
        Reading::Sensed(v) => {
            let t = ((v - scale.out_min) / (scale.out_max - scale.out_min)).clamp(0.0, 1.0);
            Color::Rgb((t * 255.0) as u8, 40, ((1.0 - t) * 255.0) as u8)
        }
    }
}

/// One text line per grid row, one coloured cell per node. `grid` is
/// already on the display scale.
pub fn heatmap_lines(grid: &Grid, scale: &DisplayScale) -> Vec<Line<'static>> {
    grid.iter_rows()
        .map(|row| {
            let spans: Vec<Span<'static>> = row
                .iter()
                .map(|&reading| {
                    let text = match reading {
                        Reading::Sensed(v) => format!("{:>4.0} ", v),
                        Reading::NoData => "   · ".to_string(),
                    };
                    Span::styled(
                        text,
                        Style::default().fg(Color::White).bg(heat_color(reading, scale)),
                    )
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

/// Draw every frame coming out of `frames` as a heatmap until the user hits
/// a key or the pipeline closes.
pub fn pressure_view(
    frames: Receiver<Result<DecodedFrame, FormatError>>,
    scale: DisplayScale,
) -> Result<ViewSummary, GuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut summary = ViewSummary::default();
    let mut sequence = FrameSequence::new();
    let mut latest: Option<(u16, Grid)> = None;
    let mut link_open = true;

    loop {
        while link_open {
            match frames.try_recv() {
                Ok(Ok(frame)) => {
                    sequence.observe(frame.frame_id);
                    summary.frames += 1;
                    latest = Some((frame.frame_id, frame.rescaled(&scale)));
                }
                Ok(Err(_)) => summary.rejected += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => link_open = false,
            }
        }
        summary.missed = sequence.missed();

        let title = Title::from(" Insole Pressure ".magenta().bold());
        let status = Title::from(Line::from(vec![
            format!(
                " frames {}  lost {}  rejected {}  delivery {:.1}% ",
                summary.frames,
                summary.missed,
                summary.rejected,
                sequence.delivery_ratio() * 100.0
            )
            .into(),
            if link_open {
                " Quit ".into()
            } else {
                " link closed, Quit ".red()
            },
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(status.alignment(Alignment::Center).position(Position::Bottom))
            .borders(Borders::ALL);
        let body = match &latest {
            Some((frame_id, grid)) => {
                let mut lines = vec![Line::from(format!("frame {}", frame_id)), Line::from("")];
                lines.extend(heatmap_lines(grid, &scale));
                Paragraph::new(lines)
            }
            None => Paragraph::new("waiting for the insole to finish warming up..."),
        };
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(body.block(block), area);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(summary)
}
