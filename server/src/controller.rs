use std::time::Duration;

use tokio::{sync::mpsc, time};
use tracing::{debug, info, instrument, warn};

use mines_common::{
    models::{Digits, GameParams},
    protocol::{BoardEvent, CellAction, ClientMessage, Phase, ServerMessage},
};

use crate::{
    config::Settings,
    error::{BoardError, Result},
    logic::{Board, Outcome, check_params},
    timer::GameTimer,
};

/// Sets the revealing flag for as long as it lives.
struct Revealing<'a>(&'a mut bool);

impl<'a> Revealing<'a> {
    fn begin(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for Revealing<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Drives one board for one player: runs actions one at a time, keeps the
/// game clock, and pushes every visible change to `outbound`.
pub struct BoardController {
    board: Board,
    timer: GameTimer,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    reveal_delay: Duration,
    max_cells: usize,
    revealing: bool,
    started: bool,
}

impl BoardController {
    /// Creates a game on a fresh board, refusing boards larger than
    /// `settings.max_cells`.
    pub fn new(
        params: GameParams,
        settings: &Settings,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Self> {
        check_params(&params, settings.max_cells)?;
        Ok(Self::with_board(Board::new(params)?, settings, outbound))
    }

    pub fn with_board(
        board: Board,
        settings: &Settings,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            board,
            timer: GameTimer::new(),
            outbound,
            reveal_delay: settings.reveal_delay,
            max_cells: settings.max_cells,
            revealing: false,
            started: false,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn elapsed(&self) -> u64 {
        self.timer.elapsed()
    }

    pub fn is_clock_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn phase(&self) -> Phase {
        if self.board.is_over() {
            self.board.status().phase()
        } else if self.revealing {
            Phase::Revealing
        } else if self.started {
            Phase::Playing
        } else {
            Phase::Idle
        }
    }

    /// Sends the initial board to the UI and starts the clock.
    pub fn start(&mut self) {
        let params = self.board.params();
        self.send(ServerMessage::Init {
            rows: params.rows,
            columns: params.columns,
            mines: params.mines,
            field: self.board.snapshot(),
            remaining_mines: Digits::new(self.board.remaining_mines()),
            time: self.timer.display(),
        });
        self.timer.start(Some(self.outbound.clone()));
        self.started = true;
        info!(
            "Game started: {}x{} with {} mines",
            params.rows, params.columns, params.mines
        );
    }

    /// Handles one inbound message.
    pub async fn handle(&mut self, message: ClientMessage) {
        if let Some(action) = message.cell_action() {
            if let Err(e) = self.dispatch(action).await {
                warn!("Ignoring action {:?}: {}", action, e);
            }
            return;
        }

        match message {
            ClientMessage::EndGame => self.end_game(),
            ClientMessage::Restart { params } => {
                if let Err(e) = self.restart(params) {
                    warn!("Refusing to restart with {:?}: {}", params, e);
                }
            }
            _ => {}
        }
    }

    /// Runs one board action. Once the game is over every action only asks
    /// the application for a new game.
    #[instrument(level = "trace", skip(self), fields(row = action.cell.row, column = action.cell.column))]
    pub async fn dispatch(&mut self, action: CellAction) -> Result<()> {
        if self.board.is_over() {
            self.publish(BoardEvent::NewGame);
            return Ok(());
        }

        if !self.board.accepts(&action) {
            if !self.board.contains(action.cell) {
                return Err(BoardError::OutOfBounds(action.cell));
            }
            debug!("Action {:?} changes nothing", action.kind);
            return Ok(());
        }

        let is_reveal = action.kind.is_reveal();
        if is_reveal {
            self.wait_for_reveal().await;
        }

        let outcome = self.board.apply(action)?;
        self.emit(outcome, is_reveal);
        Ok(())
    }

    async fn wait_for_reveal(&mut self) {
        self.send(ServerMessage::Update {
            updates: Vec::new(),
            remaining_mines: Digits::new(self.board.remaining_mines()),
            phase: Phase::Revealing,
        });
        let _revealing = Revealing::begin(&mut self.revealing);
        time::sleep(self.reveal_delay).await;
    }

    /// The player's end button: a finished game asks for a new one, a running
    /// game asks the UI to confirm the abort.
    pub fn end_game(&mut self) {
        if self.board.is_over() {
            self.publish(BoardEvent::NewGame);
        } else {
            self.publish(BoardEvent::AbortGame);
        }
    }

    /// Replaces the board and clock with fresh ones. On invalid or oversized
    /// `params` the current game keeps going.
    pub fn restart(&mut self, params: GameParams) -> Result<()> {
        check_params(&params, self.max_cells)?;
        let board = Board::new(params)?;
        self.timer.stop();
        self.timer = GameTimer::new();
        self.board = board;
        self.started = false;
        self.start();
        Ok(())
    }

    fn emit(&mut self, outcome: Outcome, always_update: bool) {
        if matches!(outcome.event, Some(BoardEvent::Win | BoardEvent::GameOver)) {
            self.timer.stop();
        }

        if always_update || !outcome.updates.is_empty() {
            self.send(ServerMessage::Update {
                updates: outcome.updates,
                remaining_mines: Digits::new(self.board.remaining_mines()),
                phase: self.phase(),
            });
        }

        if let Some(event) = outcome.event {
            self.publish(event);
        }
    }

    fn publish(&self, event: BoardEvent) {
        debug!("Publishing board event {:?}", event);
        self.send(ServerMessage::Board { event });
    }

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).is_err() {
            debug!("Outbound channel closed, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use mines_common::{
        models::{CellView, Neighbours, Pos},
        protocol::CellUpdate,
    };

    use super::*;

    const DELAY: Duration = Duration::from_millis(20);

    fn settings() -> Settings {
        Settings {
            reveal_delay: DELAY,
            max_cells: 100,
            ..Settings::default()
        }
    }

    fn controller(
        rows: usize,
        columns: usize,
        mines: &[Pos],
    ) -> (BoardController, mpsc::UnboundedReceiver<ServerMessage>) {
        let params = GameParams {
            rows,
            columns,
            mines: 0,
        };
        let board = Board::with_mines(params, mines).unwrap();
        let (sender, receiver) = mpsc::unbounded_channel();
        (BoardController::with_board(board, &settings(), sender), receiver)
    }

    /// Everything sent so far, minus clock ticks.
    fn drain(receiver: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if !matches!(message, ServerMessage::Tick { .. }) {
                messages.push(message);
            }
        }
        messages
    }

    fn events(messages: &[ServerMessage]) -> Vec<BoardEvent> {
        messages
            .iter()
            .filter_map(|message| match message {
                ServerMessage::Board { event } => Some(*event),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn start_sends_the_board_and_runs_the_clock() {
        let (mut controller, mut receiver) = controller(2, 3, &[Pos::new(0, 0)]);
        assert_eq!(controller.phase(), Phase::Idle);

        controller.start();

        assert_eq!(controller.phase(), Phase::Playing);
        assert!(controller.is_clock_running());
        let messages = drain(&mut receiver);
        let [ServerMessage::Init {
            rows,
            columns,
            mines,
            field,
            remaining_mines,
            time: clock,
        }] = messages.as_slice()
        else {
            panic!("expected a single init message, got {messages:?}");
        };
        assert_eq!((*rows, *columns, *mines), (2, 3, 1));
        assert_eq!(field.len(), 2);
        assert_eq!(remaining_mines.to_string(), "  1");
        assert_eq!(clock.to_string(), "  0");

        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(controller.elapsed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_waits_for_the_delay_and_reports_revealing() {
        let (mut controller, mut receiver) = controller(3, 3, &[Pos::new(0, 0), Pos::new(2, 2)]);
        controller.start();
        drain(&mut receiver);

        let before = Instant::now();
        controller
            .dispatch(CellAction::reveal(Pos::new(0, 1)))
            .await
            .unwrap();

        assert!(Instant::now() - before >= DELAY);
        assert_eq!(controller.phase(), Phase::Playing);
        let messages = drain(&mut receiver);
        assert_eq!(
            messages,
            vec![
                ServerMessage::Update {
                    updates: Vec::new(),
                    remaining_mines: Digits::new(2),
                    phase: Phase::Revealing,
                },
                ServerMessage::Update {
                    updates: vec![CellUpdate {
                        pos: Pos::new(0, 1),
                        value: CellView::Revealed {
                            neighbours: Neighbours::Count(1)
                        },
                    }],
                    remaining_mines: Digits::new(2),
                    phase: Phase::Playing,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mark_runs_without_delay() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(0, 0)]);
        controller.start();
        drain(&mut receiver);

        let before = Instant::now();
        controller
            .dispatch(CellAction::mark(Pos::new(0, 0)))
            .await
            .unwrap();

        assert_eq!(Instant::now(), before);
        let messages = drain(&mut receiver);
        assert_eq!(messages.len(), 1);
        let ServerMessage::Update {
            remaining_mines,
            phase,
            ..
        } = &messages[0]
        else {
            panic!("expected an update, got {messages:?}");
        };
        assert_eq!(remaining_mines.to_string(), "  0");
        assert_eq!(*phase, Phase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_actions_skip_the_delay() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(0, 0)]);
        controller.start();
        controller
            .dispatch(CellAction::mark(Pos::new(0, 0)))
            .await
            .unwrap();
        drain(&mut receiver);

        let before = Instant::now();
        controller
            .dispatch(CellAction::reveal(Pos::new(0, 0)))
            .await
            .unwrap();
        controller
            .dispatch(CellAction::reveal_neighbours(Pos::new(1, 1)))
            .await
            .unwrap();

        assert_eq!(Instant::now(), before);
        assert!(drain(&mut receiver).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn losing_stops_the_clock_and_publishes_game_over() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        time::sleep(Duration::from_millis(1500)).await;

        controller
            .dispatch(CellAction::reveal(Pos::new(1, 1)))
            .await
            .unwrap();

        assert_eq!(controller.phase(), Phase::Lost);
        assert!(!controller.is_clock_running());
        let messages = drain(&mut receiver);
        assert_eq!(events(&messages), vec![BoardEvent::GameOver]);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(controller.elapsed(), 1);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn winning_publishes_win() {
        let (mut controller, mut receiver) = controller(1, 3, &[Pos::new(0, 0)]);
        controller.start();

        controller
            .dispatch(CellAction::reveal(Pos::new(0, 2)))
            .await
            .unwrap();

        assert_eq!(controller.phase(), Phase::Won);
        assert!(controller.board().is_won());
        assert_eq!(events(&drain(&mut receiver)), vec![BoardEvent::Win]);
    }

    #[tokio::test(start_paused = true)]
    async fn actions_after_the_end_ask_for_a_new_game() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        controller
            .dispatch(CellAction::reveal(Pos::new(1, 1)))
            .await
            .unwrap();
        drain(&mut receiver);

        let before = Instant::now();
        controller
            .dispatch(CellAction::mark(Pos::new(0, 0)))
            .await
            .unwrap();

        assert_eq!(Instant::now(), before);
        assert_eq!(
            drain(&mut receiver),
            vec![ServerMessage::Board {
                event: BoardEvent::NewGame
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn end_button_aborts_or_asks_for_a_new_game() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        drain(&mut receiver);

        controller.end_game();
        assert_eq!(events(&drain(&mut receiver)), vec![BoardEvent::AbortGame]);
        assert_eq!(controller.phase(), Phase::Playing);

        controller
            .dispatch(CellAction::reveal(Pos::new(1, 1)))
            .await
            .unwrap();
        drain(&mut receiver);

        controller.end_game();
        assert_eq!(events(&drain(&mut receiver)), vec![BoardEvent::NewGame]);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_grid_actions_fail() {
        let (mut controller, _receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();

        let result = controller
            .dispatch(CellAction::reveal(Pos::new(5, 0)))
            .await;

        assert_eq!(result, Err(BoardError::OutOfBounds(Pos::new(5, 0))));
        assert_eq!(controller.phase(), Phase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_delay_clears_the_revealing_flag() {
        let (mut controller, _receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();

        let result = time::timeout(
            DELAY / 2,
            controller.dispatch(CellAction::reveal(Pos::new(0, 0))),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(controller.phase(), Phase::Playing);
        assert!(controller.board().cells().all(|cell| !cell.revealed));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_board_and_clock() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        time::sleep(Duration::from_millis(3500)).await;
        controller
            .dispatch(CellAction::reveal(Pos::new(1, 1)))
            .await
            .unwrap();
        drain(&mut receiver);

        let params = GameParams {
            rows: 4,
            columns: 5,
            mines: 3,
        };
        controller.restart(params).unwrap();

        assert_eq!(controller.phase(), Phase::Playing);
        assert_eq!(controller.elapsed(), 0);
        assert!(controller.is_clock_running());
        assert_eq!(controller.board().params(), params);
        let messages = drain(&mut receiver);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::Init {
                rows: 4,
                columns: 5,
                mines: 3,
                ..
            }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_restart_keeps_the_current_game() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        drain(&mut receiver);

        controller
            .handle(ClientMessage::Restart {
                params: GameParams {
                    rows: 2,
                    columns: 2,
                    mines: 4,
                },
            })
            .await;

        assert_eq!(controller.board().params().mines, 1);
        assert!(controller.is_clock_running());
        assert!(drain(&mut receiver).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_boards_are_refused() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let params = GameParams {
            rows: 10,
            columns: 11,
            mines: 5,
        };
        assert_eq!(
            BoardController::new(params, &settings(), sender).err(),
            Some(BoardError::TooLarge {
                rows: 10,
                columns: 11,
                max_cells: 100
            })
        );

        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        drain(&mut receiver);

        let result = controller.restart(GameParams {
            rows: usize::MAX,
            columns: 3,
            mines: 1,
        });

        assert!(matches!(result, Err(BoardError::TooLarge { .. })));
        assert_eq!(controller.board().params().rows, 2);
        assert!(drain(&mut receiver).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn handle_routes_cell_messages_to_the_board() {
        let (mut controller, mut receiver) = controller(2, 2, &[Pos::new(1, 1)]);
        controller.start();
        drain(&mut receiver);

        controller
            .handle(ClientMessage::Mark {
                cell: Pos::new(0, 1),
            })
            .await;
        controller
            .handle(ClientMessage::Reveal {
                cell: Pos::new(9, 9),
            })
            .await;
        controller.handle(ClientMessage::EndGame).await;

        let messages = drain(&mut receiver);
        assert_eq!(messages.len(), 2);
        assert_eq!(events(&messages), vec![BoardEvent::AbortGame]);
    }
}
