use crate::{
    controller::GameView,
    ids::ObjectId,
    snapshot::{
        Coord,
        Direction,
        GameSnapshot,
        GameStatus,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    layout::Direction as Axis,
    prelude::*,
    widgets::*,
};
use std::io::{
    Stdout,
    stdout,
};

/// Largest board edge drawn cell by cell; bigger boards are clipped.
const MAX_DRAWN_EDGE: u64 = 32;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    CreateGame,
    Join(ObjectId),
    ChooseStart(Coord),
    Start,
    Move(Direction),
    ForceTimeout,
    Refresh,
    Leave,
}

#[derive(Debug)]
pub struct UiState {
    mode: Mode,
    cursor: Coord,
    board_size: u64,
    phase: Option<GameStatus>,
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            cursor: Coord::default(),
            board_size: 0,
            phase: None,
            terminal: None,
        }
    }
}

impl UiState {
    pub fn cursor(&self) -> Coord {
        self.cursor
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    JoinModal(JoinState),
    QuitModal,
}

#[derive(Clone, Debug, Default)]
struct JoinState {
    input: String,
    error: Option<String>,
}

pub type InputEvents = EventStream;

pub fn input_event_stream() -> InputEvents {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEvents) -> Result<Event> {
    match events.next().await {
        Some(Ok(event)) => Ok(event),
        Some(Err(err)) => Err(err.into()),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // one persistent terminal keeps its buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &GameView) -> Result<()> {
    remember_view(state, view);
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Caches what key handling needs from the last rendered view.
fn remember_view(state: &mut UiState, view: &GameView) {
    let snapshot = view.snapshot.as_deref();
    let phase = snapshot.map(|s| s.status);
    let size = snapshot.map(|s| s.board_size).unwrap_or(0);
    if phase != state.phase || size != state.board_size {
        let max = size.saturating_sub(1);
        state.cursor = Coord::new(state.cursor.x.min(max), state.cursor.y.min(max));
    }
    state.phase = phase;
    state.board_size = size;
}

/// Maps a terminal event to a user intent. Returns `None` for events that change
/// nothing.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }

    match &mut state.mode {
        Mode::JoinModal(join) => {
            let (event, close) = join_modal_key(join, key);
            if close {
                state.mode = Mode::Normal;
            }
            return event;
        }
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Enter => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    if state.phase == Some(GameStatus::Placement)
        && let Some(direction) = arrow(key.code)
    {
        state.cursor = state.cursor.step(direction, state.board_size);
        return Some(UserEvent::Redraw);
    }
    if state.phase == Some(GameStatus::Active)
        && let Some(direction) = arrow(key.code).or_else(|| wasd(key.code))
    {
        return Some(UserEvent::Move(direction));
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('c') => Some(UserEvent::CreateGame),
        KeyCode::Char('j') => {
            state.mode = Mode::JoinModal(JoinState::default());
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter if state.phase == Some(GameStatus::Placement) => {
            Some(UserEvent::ChooseStart(state.cursor))
        }
        KeyCode::Char('s') => Some(UserEvent::Start),
        KeyCode::Char('t') => Some(UserEvent::ForceTimeout),
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        KeyCode::Char('l') => Some(UserEvent::Leave),
        _ => None,
    }
}

/// Returns the event and whether the modal closes.
fn join_modal_key(join: &mut JoinState, key: KeyEvent) -> (Option<UserEvent>, bool) {
    match key.code {
        KeyCode::Esc => (Some(UserEvent::Redraw), true),
        KeyCode::Enter => match join.input.trim().parse::<ObjectId>() {
            Ok(game) => (Some(UserEvent::Join(game)), true),
            Err(err) => {
                join.error = Some(err.to_string());
                (Some(UserEvent::Redraw), false)
            }
        },
        KeyCode::Backspace => {
            join.input.pop();
            join.error = None;
            (Some(UserEvent::Redraw), false)
        }
        KeyCode::Char(c) if c.is_ascii_hexdigit() || c == 'x' => {
            join.input.push(c);
            join.error = None;
            (Some(UserEvent::Redraw), false)
        }
        _ => (None, false),
    }
}

fn arrow(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::Up => Some(Direction::Up),
        KeyCode::Right => Some(Direction::Right),
        KeyCode::Down => Some(Direction::Down),
        KeyCode::Left => Some(Direction::Left),
        _ => None,
    }
}

fn wasd(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::Char('w') => Some(Direction::Up),
        KeyCode::Char('d') => Some(Direction::Right),
        KeyCode::Char('s') => Some(Direction::Down),
        KeyCode::Char('a') => Some(Direction::Left),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &GameView) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Axis::Vertical)
        .constraints([
            Constraint::Length(4), // game overview
            Constraint::Min(8),    // board + players
            Constraint::Length(5), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_overview(f, chunks[0], view);
    let middle = Layout::default()
        .direction(Axis::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);
    draw_board(f, middle[0], state, view);
    draw_players(f, middle[1], view);
    draw_status(f, chunks[2], view);
    draw_help(f, chunks[3], state);
    draw_modals(f, state);
}

fn draw_overview(f: &mut Frame, area: Rect, view: &GameView) {
    let mut lines = vec![Line::from(format!("You: {}", view.me.short()))];
    match (&view.game_id, view.snapshot.as_deref()) {
        (None, _) => lines.push(Line::from("No game selected. c create | j join")),
        (Some(game), None) => {
            lines.push(Line::from(format!("Game {} | loading...", game.short())))
        }
        (Some(game), Some(snap)) => {
            let mut text = format!(
                "Game {} | {} | Tiles left: {}",
                game.short(),
                snap.status,
                snap.tiles_remaining
            );
            if let Some(turn) = turn_label(view, snap) {
                text.push_str(&format!(" | {turn}"));
            }
            if let Some(left) = view.eligibility.time_remaining {
                text.push_str(&format!(" | {}s left", left.as_secs()));
            }
            lines.push(Line::from(text));
        }
    }
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Game"));
    f.render_widget(widget, area);
}

fn turn_label(view: &GameView, snap: &GameSnapshot) -> Option<String> {
    match snap.status {
        GameStatus::Active => snap.current_player().map(|p| {
            if *p == view.me {
                "Your turn".to_string()
            } else {
                format!("Waiting for {}", p.short())
            }
        }),
        GameStatus::Finished => Some(match &snap.winner {
            Some(w) if *w == view.me => "You won".to_string(),
            Some(w) => format!("Winner: {}", w.short()),
            None => "Draw".to_string(),
        }),
        _ => None,
    }
}

fn draw_board(f: &mut Frame, area: Rect, state: &UiState, view: &GameView) {
    let block = Block::default().borders(Borders::ALL).title("Board");
    let Some(snap) = view.snapshot.as_deref() else {
        f.render_widget(Paragraph::new("").block(block), area);
        return;
    };
    let show_cursor = snap.status == GameStatus::Placement && view.eligibility.choose_start;
    let edge = snap.board_size.min(MAX_DRAWN_EDGE);
    let lines: Vec<Line> = (0..edge)
        .map(|y| {
            let spans: Vec<Span> = (0..edge)
                .map(|x| {
                    let at = Coord::new(x, y);
                    let (glyph, style) = cell_glyph(view, snap, at);
                    if show_cursor && at == state.cursor {
                        Span::styled(
                            format!("[{glyph}]"),
                            style.add_modifier(Modifier::REVERSED),
                        )
                    } else {
                        Span::styled(format!(" {glyph} "), style)
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn cell_glyph(view: &GameView, snap: &GameSnapshot, at: Coord) -> (char, Style) {
    let placed = |idx: usize| {
        snap.status != GameStatus::Placement || snap.has_placed.get(idx).copied().unwrap_or(false)
    };
    if let Some(idx) = snap.player_at(at).filter(|idx| placed(*idx)) {
        let glyph = char::from_digit(idx as u32 + 1, 10).unwrap_or('?');
        let style = if snap.players.get(idx) == Some(&view.me) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        return (glyph, style);
    }
    if let Some(tile) = view.tiles.iter().find(|t| t.position == at) {
        return if tile.claimed {
            ('.', Style::default().fg(Color::DarkGray))
        } else {
            ('*', Style::default().fg(Color::Green))
        };
    }
    if view.tiles.is_empty() && snap.tile_positions.contains(&at) {
        return ('*', Style::default().fg(Color::Green));
    }
    ('·', Style::default().fg(Color::DarkGray))
}

fn draw_players(f: &mut Frame, area: Rect, view: &GameView) {
    let mut lines = Vec::new();
    match view.snapshot.as_deref() {
        None => lines.push(Line::styled("None", Style::default().fg(Color::DarkGray))),
        Some(snap) => {
            for (idx, player) in snap.players.iter().enumerate() {
                let you = if *player == view.me { " (you)" } else { "" };
                let score = snap.player_scores.get(idx).copied().unwrap_or(0);
                let mut text = format!("P{} {}{} score {}", idx + 1, player.short(), you, score);
                if snap.status == GameStatus::Placement {
                    let placed = snap.has_placed.get(idx).copied().unwrap_or(false);
                    text.push_str(if placed { " placed" } else { " placing" });
                }
                lines.push(Line::from(text));
            }
            if snap.players.is_empty() {
                lines.push(Line::from("Waiting for players"));
            }
            if let Some(cap) = &view.move_cap {
                lines.push(Line::from(""));
                lines.push(Line::from(format!("Moves left: {}", cap.moves_remaining)));
            }
        }
    }
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Players"));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &GameView) {
    let widget = match &view.notice {
        Some(notice) if notice.is_error => Paragraph::new(notice.message.clone())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red)),
        notice => {
            let mut lines = vec![Line::from(view.status.clone())];
            if view.in_flight {
                lines.push(Line::from("Waiting for the transaction..."));
            }
            if let Some(notice) = notice {
                lines.push(Line::from(notice.message.clone()));
            }
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title("Status"))
                .style(Style::default().fg(Color::Green))
        }
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, state: &UiState) {
    let text = match state.phase {
        Some(GameStatus::Placement) => {
            "arrows pick cell | Enter place | s start | r refresh | l leave | q/Esc quit"
        }
        Some(GameStatus::Active) => {
            "arrows/WASD move | t force timeout | r refresh | l leave | q/Esc quit"
        }
        _ => "c create | j join | r refresh | l leave | q/Esc quit",
    };
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::JoinModal(join) => {
            let area = centered_rect(60, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("Join Game");
            let mut lines = vec![
                Line::from(format!("Game id: {}", join.input)),
                Line::from("Enter=join Esc=cancel"),
            ];
            if let Some(err) = &join.error {
                lines.push(Line::styled(err.clone(), Style::default().fg(Color::Red)));
            }
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(30, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Quit");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new("Quit? y/n"), block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Axis::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Axis::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        test_helpers::{
            ADDR_A,
            ADDR_B,
            GAME_ID,
            snapshot_with,
        },
        turn::Eligibility,
    };
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn view_of(snapshot: Option<GameSnapshot>) -> GameView {
        GameView {
            me: ADDR_A.parse().unwrap(),
            game_id: snapshot.as_ref().map(|s| s.id.clone()),
            snapshot: snapshot.map(Arc::new),
            eligibility: Eligibility::default(),
            move_cap: None,
            tiles: Vec::new(),
            in_flight: false,
            status: "Ready".to_string(),
            notice: None,
        }
    }

    fn state_for(status: GameStatus, board_size: u64) -> UiState {
        let mut snapshot = snapshot_with(status, &[ADDR_A, ADDR_B]);
        snapshot.board_size = board_size;
        let mut state = UiState::default();
        remember_view(&mut state, &view_of(Some(snapshot)));
        state
    }

    #[test]
    fn interpret_event__arrows_move_in_active_game() {
        let mut state = state_for(GameStatus::Active, 5);

        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Left)),
            Some(UserEvent::Move(Direction::Left))
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('s'))),
            Some(UserEvent::Move(Direction::Down))
        );
    }

    #[test]
    fn interpret_event__placement_moves_cursor_and_enter_chooses() {
        // given
        let mut state = state_for(GameStatus::Placement, 3);

        // when
        interpret_event(&mut state, press(KeyCode::Right));
        interpret_event(&mut state, press(KeyCode::Right));
        interpret_event(&mut state, press(KeyCode::Right));
        interpret_event(&mut state, press(KeyCode::Down));
        let chosen = interpret_event(&mut state, press(KeyCode::Enter));

        // then
        assert_eq!(chosen, Some(UserEvent::ChooseStart(Coord::new(2, 1))));
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('s'))),
            Some(UserEvent::Start)
        );
    }

    #[test]
    fn interpret_event__join_modal_parses_game_id() {
        let mut state = UiState::default();
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('j'))),
            Some(UserEvent::Redraw)
        );
        for c in "0xzaaa".chars() {
            interpret_event(&mut state, press(KeyCode::Char(c)));
        }

        let joined = interpret_event(&mut state, press(KeyCode::Enter));

        assert_eq!(joined, Some(UserEvent::Join(GAME_ID.parse().unwrap())));
        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn interpret_event__join_modal_keeps_bad_input_open() {
        let mut state = UiState::default();
        interpret_event(&mut state, press(KeyCode::Char('j')));

        let result = interpret_event(&mut state, press(KeyCode::Enter));

        assert_eq!(result, Some(UserEvent::Redraw));
        assert!(matches!(&state.mode, Mode::JoinModal(join) if join.error.is_some()));
    }

    #[test]
    fn interpret_event__quit_needs_confirmation() {
        let mut state = UiState::default();

        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('q'))),
            Some(UserEvent::Redraw)
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('c'))),
            None
        );
        assert_eq!(
            interpret_event(&mut state, press(KeyCode::Char('y'))),
            Some(UserEvent::Quit)
        );
    }

    #[test]
    fn ui__renders_players_and_turn() {
        // given
        let mut snapshot = snapshot_with(GameStatus::Active, &[ADDR_A, ADDR_B]);
        snapshot.current_turn = 0;
        let view = view_of(Some(snapshot));
        let state = UiState::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

        // when
        terminal.draw(|f| ui(f, &state, &view)).unwrap();

        // then
        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("Your turn"));
        assert!(rendered.contains("(you)"));
        assert!(rendered.contains("Active"));
    }
}
