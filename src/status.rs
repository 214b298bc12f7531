use crate::channel::ChannelState;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, Write};

/// Width of the channel name column.
const NAME_WIDTH: usize = 17;

/// Render one line per channel: name, live indicator, announcement flag.
pub fn render_table(states: &[ChannelState], color: bool) -> String {
    let mut out = String::new();
    for state in states {
        out.push_str(&render_line(state, color));
        out.push('\n');
    }
    out
}

fn render_line(state: &ChannelState, color: bool) -> String {
    // Pad inside the brackets so both labels line up.
    let label = if state.is_live { "  LIVE   " } else { " OFFLINE " };
    let notified = state.has_notified.to_string();
    if !color {
        return format!(
            "{:<width$} -> [{}] notified: {}",
            state.name,
            label,
            notified,
            width = NAME_WIDTH
        );
    }
    let label = if state.is_live {
        label.green().to_string()
    } else {
        label.red().to_string()
    };
    format!(
        "{:<width$} -> [{}] notified: {}",
        state.name,
        label,
        notified.cyan(),
        width = NAME_WIDTH
    )
}

/// Clear the terminal and draw the table plus a footer line.
pub fn print_table(states: &[ChannelState], footer: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
    write!(stdout, "{}", render_table(states, true))?;
    writeln!(stdout, "{}", footer)?;
    stdout.flush()
}
