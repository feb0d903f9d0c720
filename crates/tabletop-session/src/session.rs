//! Session state machine.
//!
//! A [`Session`] referees one game between seated players. Actions arrive
//! either from the local player (`play_*`, [`pass`](Session::pass),
//! [`surrender`](Session::surrender), [`roll_dice`](Session::roll_dice)),
//! which return the message to send to the relay, or from the relay through
//! [`receive`](Session::receive).
//!
//! Remote moves and places start a visual transition. Until the renderer
//! reports [`animation_finished`](Session::animation_finished), incoming
//! messages wait in the [`PendingQueue`] in arrival order. Draining replays
//! them one at a time and halts after the first message whose kind ends a
//! draining pass (see [`Flow`]).

use std::collections::VecDeque;
use std::collections::vec_deque;

use rand::Rng;
use tabletop_net::messages::{Dice, GameRef, Move, Place};
use tabletop_net::{Address, Coord, Message, Payload};

use crate::error::{RuleViolation, SessionError};
use crate::rules::{Outcome, Path, Rules, SideId};

// ---------------------------------------------------------------------------
// Seats, state, events
// ---------------------------------------------------------------------------

/// A player sitting at one side of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    /// Relay address of the controlling player.
    pub player: Address,
    /// Display name of the controlling player.
    pub name: String,
}

impl Seat {
    pub fn new(player: Address, name: impl Into<String>) -> Self {
        Self {
            player,
            name: name.into(),
        }
    }
}

/// Coarse view of what the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the remote player controlling this side.
    Idle(SideId),
    /// Waiting for the local player.
    AwaitingOwnMove,
    /// A transition is animating; incoming messages are queued.
    AnimatingTransition,
    /// The game has a result.
    Ended,
}

/// Whether a draining pass may continue after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    /// Moves, places, passes and surrenders may start a transition or end
    /// the game, so a draining pass checks the session after each one.
    /// Everything else lets it continue unconditionally.
    pub fn of(payload: &Payload) -> Self {
        match payload {
            Payload::Move(_) | Payload::Place(_) | Payload::Pass(_) | Payload::Surrender(_) => {
                Flow::Stop
            }
            _ => Flow::Continue,
        }
    }
}

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Won(SideId),
    Surrendered { loser: SideId, winner: SideId },
    Stalemate,
}

impl GameResult {
    pub fn winner(&self) -> Option<SideId> {
        match *self {
            GameResult::Won(side) | GameResult::Surrendered { winner: side, .. } => Some(side),
            GameResult::Stalemate => None,
        }
    }
}

/// Things the renderer should show, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TurnStarted { side: SideId },
    PieceMoved { side: SideId, path: Path },
    PiecePlaced { side: SideId, at: Coord },
    DiceRolled { side: SideId, number: u8 },
    Passed { side: SideId },
    GameEnded(GameResult),
}

// ---------------------------------------------------------------------------
// PendingQueue
// ---------------------------------------------------------------------------

/// Messages that arrived while the session was busy, oldest first.
#[derive(Debug, Default)]
pub struct PendingQueue {
    messages: VecDeque<Message>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push_back(msg);
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One running game.
pub struct Session {
    game: String,
    rules: Box<dyn Rules>,
    seats: Vec<Seat>,
    local: Address,
    current: SideId,
    busy: bool,
    result: Option<GameResult>,
    pending: PendingQueue,
    events: VecDeque<SessionEvent>,
}

impl Session {
    /// Start a game. `seats` are in turn order and must match the sides the
    /// rules declare; `local` is the address of this process's player.
    ///
    /// The first side's turn is entered immediately, so a side with nothing
    /// to do is passed over right away.
    pub fn new(
        game: impl Into<String>,
        rules: Box<dyn Rules>,
        seats: Vec<Seat>,
        local: Address,
    ) -> Result<Self, SessionError> {
        let expected = rules.side_names().len();
        if seats.len() != expected || expected == 0 {
            return Err(SessionError::SeatMismatch {
                expected,
                got: seats.len(),
            });
        }

        let mut session = Self {
            game: game.into(),
            rules,
            seats,
            local,
            current: SideId(0),
            busy: false,
            result: None,
            pending: PendingQueue::new(),
            events: VecDeque::new(),
        };
        tracing::info!(
            "Starting {} with {} seats",
            session.game,
            session.seats.len()
        );
        session.enter_turn(SideId(0));
        Ok(session)
    }

    /// Game-type tag this session was created from.
    pub fn game(&self) -> &str {
        &self.game
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn rules(&self) -> &dyn Rules {
        self.rules.as_ref()
    }

    pub fn local_address(&self) -> Address {
        self.local
    }

    pub fn current_side(&self) -> SideId {
        self.current
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Name of `side` as the rules call it.
    pub fn side_name(&self, side: SideId) -> &'static str {
        self.rules.side_names().get(side.0).copied().unwrap_or("?")
    }

    /// Every seat belongs to the local player.
    pub fn is_hotseat(&self) -> bool {
        self.seats.iter().all(|seat| seat.player == self.local)
    }

    /// Whether the local player may act right now.
    pub fn is_local_turn(&self) -> bool {
        self.state() == SessionState::AwaitingOwnMove
    }

    pub fn state(&self) -> SessionState {
        if self.result.is_some() {
            SessionState::Ended
        } else if self.busy {
            SessionState::AnimatingTransition
        } else if self.seats[self.current.0].player == self.local {
            SessionState::AwaitingOwnMove
        } else {
            SessionState::Idle(self.current)
        }
    }

    /// Take every event recorded since the last call.
    pub fn drain_events(&mut self) -> vec_deque::Drain<'_, SessionEvent> {
        self.events.drain(..)
    }

    // -- remote input -------------------------------------------------------

    /// Handle a message from the relay.
    ///
    /// While a transition is animating the message is queued. Otherwise it is
    /// processed at once, unless older messages are still waiting, in which
    /// case it joins the back of the queue and a draining pass runs.
    pub fn receive(&mut self, msg: Message) {
        if self.busy {
            tracing::debug!("Queueing {:?} from {}", msg.tag(), msg.source);
            self.pending.push(msg);
        } else if !self.pending.is_empty() {
            self.pending.push(msg);
            self.drain_pending();
        } else {
            self.process(msg);
        }
    }

    /// The renderer finished the current transition.
    pub fn animation_finished(&mut self) {
        self.busy = false;
        self.drain_pending();
    }

    fn drain_pending(&mut self) {
        while !self.busy {
            let Some(msg) = self.pending.pop() else {
                break;
            };
            tracing::trace!("Draining {:?} from {}", msg.tag(), msg.source);
            // A stop-class message that left the session idle and running
            // must not strand the rest of the queue.
            if self.process(msg) == Flow::Stop && (self.busy || self.result.is_some()) {
                break;
            }
        }
    }

    fn process(&mut self, msg: Message) -> Flow {
        let flow = Flow::of(&msg.payload);
        if let Err(violation) = self.apply_remote(&msg) {
            tracing::warn!(
                "Ignoring {:?} from {}: {violation}",
                msg.tag(),
                msg.source
            );
        }
        flow
    }

    fn apply_remote(&mut self, msg: &Message) -> Result<(), RuleViolation> {
        match &msg.payload {
            Payload::Move(mv) => {
                let side = self.remote_turn(msg.source)?;
                let path = self.validate_move(side, mv.from, mv.to)?;
                self.commit_move(side, path);
                self.busy = true;
            }
            Payload::Place(place) => {
                let side = self.remote_turn(msg.source)?;
                self.validate_place(side, place.at)?;
                self.commit_place(side, place.at);
                self.busy = true;
            }
            Payload::Pass(_) => {
                let side = self.remote_turn(msg.source)?;
                self.commit_pass(side);
            }
            Payload::Surrender(_) => {
                self.ensure_running()?;
                let loser = self
                    .seat_of(msg.source)
                    .ok_or(RuleViolation::NotSeated(msg.source))?;
                self.commit_surrender(loser);
            }
            Payload::Dice(dice) => {
                let side = self.remote_turn(msg.source)?;
                self.commit_dice(side, dice.number);
            }
            _ => tracing::trace!("{:?} has no effect on the game", msg.tag()),
        }
        Ok(())
    }

    /// Side the remote `source` may act for right now.
    fn remote_turn(&self, source: Address) -> Result<SideId, RuleViolation> {
        self.ensure_running()?;
        if self.seats[self.current.0].player == source {
            return Ok(self.current);
        }
        match self.seat_of(source) {
            Some(_) => Err(RuleViolation::NotYourTurn {
                current: self.current,
            }),
            None => Err(RuleViolation::NotSeated(source)),
        }
    }

    // -- local input --------------------------------------------------------

    /// Move one of the current side's pieces. Returns the message announcing
    /// it. The local player already dragged the piece, so no transition
    /// starts.
    pub fn play_move(&mut self, from: Coord, to: Coord) -> Result<Message, RuleViolation> {
        let side = self.local_turn()?;
        let path = self.validate_move(side, from, to)?;
        self.commit_move(side, path);
        Ok(Message::new(Payload::Move(Move { from, to })))
    }

    /// Place a new piece for the current side.
    pub fn play_place(&mut self, at: Coord) -> Result<Message, RuleViolation> {
        let side = self.local_turn()?;
        self.validate_place(side, at)?;
        self.commit_place(side, at);
        Ok(Message::new(Payload::Place(Place { at })))
    }

    /// Give up the rest of the current turn.
    pub fn pass(&mut self) -> Result<Message, RuleViolation> {
        let side = self.local_turn()?;
        self.commit_pass(side);
        Ok(Message::new(Payload::Pass(self.game_ref())))
    }

    /// Concede the game. Allowed at any time while the game runs, even
    /// mid-transition. In hotseat play the side on turn concedes.
    pub fn surrender(&mut self) -> Result<Message, RuleViolation> {
        self.ensure_running()?;
        let loser = self
            .seat_of(self.local)
            .ok_or(RuleViolation::NotSeated(self.local))?;
        self.commit_surrender(loser);
        Ok(Message::new(Payload::Surrender(self.game_ref())))
    }

    /// Roll a six-sided die for the current side.
    pub fn roll_dice(&mut self) -> Result<Message, RuleViolation> {
        self.roll_dice_with(&mut rand::rng())
    }

    /// [`roll_dice`](Self::roll_dice) with a caller-supplied generator.
    pub fn roll_dice_with<R: Rng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Message, RuleViolation> {
        let side = self.local_turn()?;
        let number = rng.random_range(1..=6);
        self.commit_dice(side, number);
        Ok(Message::new(Payload::Dice(Dice { number })))
    }

    fn local_turn(&self) -> Result<SideId, RuleViolation> {
        self.ensure_running()?;
        if self.busy {
            return Err(RuleViolation::Busy);
        }
        if self.seats[self.current.0].player != self.local {
            return Err(RuleViolation::NotYourTurn {
                current: self.current,
            });
        }
        Ok(self.current)
    }

    fn game_ref(&self) -> GameRef {
        GameRef {
            game: Some(self.game.clone()),
            options: Default::default(),
        }
    }

    // -- shared -------------------------------------------------------------

    fn ensure_running(&self) -> Result<(), RuleViolation> {
        match self.result {
            Some(_) => Err(RuleViolation::GameOver),
            None => Ok(()),
        }
    }

    /// Side controlled by `player`, preferring the one on turn.
    fn seat_of(&self, player: Address) -> Option<SideId> {
        if self.seats[self.current.0].player == player {
            return Some(self.current);
        }
        self.seats
            .iter()
            .position(|seat| seat.player == player)
            .map(SideId)
    }

    fn next_side(&self, side: SideId) -> SideId {
        SideId((side.0 + 1) % self.seats.len())
    }

    fn validate_move(&self, side: SideId, from: Coord, to: Coord) -> Result<Path, RuleViolation> {
        for at in [from, to] {
            if !self.rules.contains(at) {
                return Err(RuleViolation::OutOfBoard(at));
            }
        }
        self.rules
            .find_path(side, from, to)
            .ok_or(RuleViolation::IllegalMove { from, to })
    }

    fn validate_place(&self, side: SideId, at: Coord) -> Result<(), RuleViolation> {
        if !self.rules.contains(at) {
            return Err(RuleViolation::OutOfBoard(at));
        }
        if !self.rules.legal_place(side, at) {
            return Err(RuleViolation::IllegalPlace(at));
        }
        Ok(())
    }

    fn commit_move(&mut self, side: SideId, path: Path) {
        let outcome = self.rules.apply_move(side, &path);
        tracing::info!(
            "{} ({}) moved along {path:?}",
            self.seats[side.0].name,
            self.side_name(side)
        );
        self.events.push_back(SessionEvent::PieceMoved { side, path });
        self.conclude(outcome);
    }

    fn commit_place(&mut self, side: SideId, at: Coord) {
        let outcome = self.rules.apply_place(side, at);
        tracing::info!(
            "{} ({}) placed at {at}",
            self.seats[side.0].name,
            self.side_name(side)
        );
        self.events.push_back(SessionEvent::PiecePlaced { side, at });
        self.conclude(outcome);
    }

    fn commit_pass(&mut self, side: SideId) {
        tracing::info!("{} passed", self.side_name(side));
        self.events.push_back(SessionEvent::Passed { side });
        self.conclude(Outcome::Continue);
    }

    fn commit_surrender(&mut self, loser: SideId) {
        tracing::info!("{} surrendered", self.side_name(loser));
        let winner = self.next_side(loser);
        self.end(GameResult::Surrendered { loser, winner });
    }

    fn commit_dice(&mut self, side: SideId, number: u8) {
        tracing::debug!("{} rolled {number}", self.side_name(side));
        self.rules.dice_rolled(side, number);
        self.events
            .push_back(SessionEvent::DiceRolled { side, number });
    }

    /// Win and stalemate end the game in place of advancing the turn.
    fn conclude(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Continue => self.enter_turn(self.next_side(self.current)),
            Outcome::Won(side) => self.end(GameResult::Won(side)),
            Outcome::Stalemate => self.end(GameResult::Stalemate),
        }
    }

    /// Hand the turn to `first`, passing over sides with nothing to do. A
    /// full cycle without a legal action is a stalemate.
    fn enter_turn(&mut self, first: SideId) {
        let mut side = first;
        for _ in 0..self.seats.len() {
            if self.rules.has_legal_action(side) {
                self.current = side;
                tracing::debug!("{}'s turn", self.side_name(side));
                self.events.push_back(SessionEvent::TurnStarted { side });
                return;
            }
            tracing::info!("{} cannot act and passes", self.side_name(side));
            self.events.push_back(SessionEvent::Passed { side });
            side = self.next_side(side);
        }
        self.current = first;
        self.end(GameResult::Stalemate);
    }

    fn end(&mut self, result: GameResult) {
        tracing::info!("{} ended: {result:?}", self.game);
        self.result = Some(result);
        self.events.push_back(SessionEvent::GameEnded(result));
    }
}
