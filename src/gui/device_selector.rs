use std::{fmt, io::stdout, path::PathBuf};

use crate::gui::error::GuiError;

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

/// Where the monitor gets its fragments from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkChoice {
    /// A radio bridge on a serial port
    Serial(PathBuf),
    /// An in-process simulated insole
    Simulator,
}

impl fmt::Display for LinkChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkChoice::Serial(path) => write!(f, "{}", path.to_string_lossy()),
            LinkChoice::Simulator => write!(f, "simulated insole"),
        }
    }
}

/// Every serial port, then the simulator, which is always available.
pub fn link_choices(available_ports: Vec<PathBuf>) -> Vec<LinkChoice> {
    available_ports
        .into_iter()
        .map(LinkChoice::Serial)
        .chain(std::iter::once(LinkChoice::Simulator))
        .collect()
}

/// Let the user pick one of `available_ports` or the simulator. `None` if
/// they quit instead.
pub fn device_selector(available_ports: Vec<PathBuf>) -> Result<Option<LinkChoice>, GuiError> {
    let mut choices = link_choices(available_ports);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_choices = choices.len();
    let mut selected = None;
    loop {
        let title = Title::from(" Insole Link ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let names = choices.iter().map(|c| c.to_string());
        let list = List::new(names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(std::time::Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => {
                            cursor = (cursor + 1) % n_choices;
                        }
                        KeyCode::Up => {
                            cursor = (cursor + n_choices - 1) % n_choices;
                        }
                        KeyCode::Enter => {
                            selected = Some(cursor);
                            break;
                        }
                        KeyCode::Char('q') => break,
                        _ => {}
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected.map(|i| choices.swap_remove(i)))
}
