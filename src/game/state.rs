//! Game State Definitions
//!
//! The client's view of one match. The relay is authoritative for every
//! field; the client only folds relay updates in and flips the optimistic
//! `is_ready` flag.

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::room::RoomId;
use crate::game::card::Card;

/// Cards in a fresh deck before dealing.
pub const FULL_DECK_COUNT: u32 = 36;

// =============================================================================
// GAME STATE
// =============================================================================

/// Authoritative client view of the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Our hand, in relay order.
    pub player_hand: Vec<Card>,
    /// How many cards the opponent holds. Their cards are never revealed.
    pub opponent_hand_count: u32,
    /// Cards on the table: even index attacks, the following odd index defends it.
    pub field_cards: Vec<Card>,
    /// Whether we act next.
    pub is_my_turn: bool,
    /// Cards left in the deck.
    pub deck_count: u32,
    /// Cards in the discard pile.
    pub discard_pile_count: u32,
    /// Trump card once revealed.
    pub trump: Option<Card>,
    /// Room this state belongs to.
    pub room_id: Option<RoomId>,
    /// Still waiting for the second player to join.
    pub waiting_for_peer: bool,
    /// We have declared ready.
    pub is_ready: bool,
    /// The opponent has declared ready.
    pub opponent_ready: bool,
    /// The relay has started the match.
    pub game_started: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            player_hand: Vec::new(),
            opponent_hand_count: 0,
            field_cards: Vec::new(),
            is_my_turn: false,
            deck_count: FULL_DECK_COUNT,
            discard_pile_count: 0,
            trump: None,
            room_id: None,
            waiting_for_peer: true,
            is_ready: false,
            opponent_ready: false,
            game_started: false,
        }
    }
}

impl GameState {
    /// Fresh state bound to a room.
    pub fn for_room(room_id: RoomId) -> Self {
        Self {
            room_id: Some(room_id),
            ..Self::default()
        }
    }

    /// Shallow-merge a partial update into this state.
    pub fn apply(&mut self, update: GameStateUpdate) {
        update.apply_to(self);
    }

    /// Attack/defense pairs currently on the table.
    pub fn field_pairs(&self) -> impl Iterator<Item = FieldPair> + '_ {
        self.field_cards.chunks(2).map(|pair| FieldPair {
            attack: pair[0],
            defense: pair.get(1).copied(),
        })
    }

    /// Attacks still waiting for a defense.
    pub fn open_attacks(&self) -> usize {
        self.field_pairs().filter(|p| p.defense.is_none()).count()
    }
}

/// One attack on the table and its defense, if beaten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldPair {
    /// Attacking card.
    pub attack: Card,
    /// Card that beat it.
    pub defense: Option<Card>,
}

// =============================================================================
// PARTIAL UPDATE
// =============================================================================

/// Partial game state pushed by the relay in a `gameState` message.
///
/// Absent fields leave the local value untouched. `trump` and `roomId` are
/// nullable on the wire: an explicit `null` clears them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    /// New hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_hand: Option<Vec<Card>>,
    /// New opponent card count.
    #[serde(default, alias = "opponentCount", skip_serializing_if = "Option::is_none")]
    pub opponent_hand_count: Option<u32>,
    /// New table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_cards: Option<Vec<Card>>,
    /// Turn flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_my_turn: Option<bool>,
    /// Deck size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_count: Option<u32>,
    /// Discard pile size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_pile_count: Option<u32>,
    /// Trump (`Some(None)` = explicit null).
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub trump: Option<Option<Card>>,
    /// Room id (`Some(None)` = explicit null).
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Option<RoomId>>,
    /// Waiting-for-peer flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for_peer: Option<bool>,
    /// Our ready flag as the relay sees it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ready: Option<bool>,
    /// Opponent ready flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_ready: Option<bool>,
    /// Match started flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_started: Option<bool>,
}

impl GameStateUpdate {
    /// Does this update carry no fields at all?
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite exactly the fields present in this update.
    ///
    /// Values are applied verbatim, including `game_started: false`.
    pub fn apply_to(self, state: &mut GameState) {
        if let Some(hand) = self.player_hand {
            state.player_hand = hand;
        }
        if let Some(count) = self.opponent_hand_count {
            state.opponent_hand_count = count;
        }
        if let Some(field) = self.field_cards {
            state.field_cards = field;
        }
        if let Some(turn) = self.is_my_turn {
            state.is_my_turn = turn;
        }
        if let Some(count) = self.deck_count {
            state.deck_count = count;
        }
        if let Some(count) = self.discard_pile_count {
            state.discard_pile_count = count;
        }
        if let Some(trump) = self.trump {
            state.trump = trump;
        }
        if let Some(room_id) = self.room_id {
            state.room_id = room_id;
        }
        if let Some(waiting) = self.waiting_for_peer {
            state.waiting_for_peer = waiting;
        }
        if let Some(ready) = self.is_ready {
            state.is_ready = ready;
        }
        if let Some(ready) = self.opponent_ready {
            state.opponent_ready = ready;
        }
        if let Some(started) = self.game_started {
            state.game_started = started;
        }
    }
}

/// Present-but-null becomes `Some(None)`; absence is handled by `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Rank, Suit};
    use proptest::prelude::*;

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    fn mid_game() -> GameState {
        GameState {
            player_hand: vec![card(Rank::Six, Suit::Hearts), card(Rank::King, Suit::Spades)],
            opponent_hand_count: 5,
            field_cards: vec![card(Rank::Seven, Suit::Clubs)],
            is_my_turn: false,
            deck_count: 18,
            discard_pile_count: 4,
            trump: Some(card(Rank::Nine, Suit::Diamonds)),
            room_id: Some(RoomId::parse("abc1234").unwrap()),
            waiting_for_peer: false,
            is_ready: true,
            opponent_ready: true,
            game_started: true,
        }
    }

    #[test]
    fn test_default_matches_fresh_table() {
        let state = GameState::default();
        assert_eq!(state.deck_count, FULL_DECK_COUNT);
        assert!(state.waiting_for_peer);
        assert!(!state.game_started);
        assert!(state.player_hand.is_empty());
    }

    #[test]
    fn test_turn_update_leaves_everything_else() {
        let mut state = mid_game();
        let before = state.clone();

        let update: GameStateUpdate = serde_json::from_str(r#"{"isMyTurn":true}"#).unwrap();
        state.apply(update);

        assert!(state.is_my_turn);
        assert_eq!(state.deck_count, before.deck_count);
        assert_eq!(state.player_hand, before.player_hand);
        assert_eq!(GameState { is_my_turn: false, ..state }, before);
    }

    #[test]
    fn test_explicit_null_clears_trump() {
        let mut state = mid_game();
        state.apply(serde_json::from_str(r#"{"trump":null}"#).unwrap());
        assert_eq!(state.trump, None);

        let mut state = mid_game();
        state.apply(serde_json::from_str(r#"{"deckCount":10}"#).unwrap());
        assert!(state.trump.is_some());
    }

    #[test]
    fn test_relay_values_applied_verbatim() {
        let mut state = mid_game();
        state.apply(serde_json::from_str(r#"{"gameStarted":false}"#).unwrap());
        assert!(!state.game_started);
    }

    #[test]
    fn test_opponent_count_alias_and_unknown_fields() {
        let update: GameStateUpdate =
            serde_json::from_str(r#"{"opponentCount":3,"somethingNew":[1,2]}"#).unwrap();
        assert_eq!(update.opponent_hand_count, Some(3));
    }

    #[test]
    fn test_full_relay_payload() {
        let json = r#"{
            "playerHand":[{"suit":"♠","rank":"6"}],
            "opponentHandCount":6,
            "fieldCards":[],
            "isMyTurn":true,
            "deckCount":24,
            "trump":{"suit":"♥","rank":"A"},
            "waitingForPeer":false,
            "isReady":true,
            "opponentReady":true,
            "gameStarted":true
        }"#;
        let mut state = GameState::default();
        state.apply(serde_json::from_str(json).unwrap());

        assert_eq!(state.player_hand, vec![card(Rank::Six, Suit::Spades)]);
        assert_eq!(state.trump, Some(card(Rank::Ace, Suit::Hearts)));
        assert_eq!(state.deck_count, 24);
        assert!(state.game_started);
    }

    #[test]
    fn test_field_pairs() {
        let mut state = GameState::default();
        state.field_cards = vec![
            card(Rank::Six, Suit::Clubs),
            card(Rank::Eight, Suit::Clubs),
            card(Rank::Six, Suit::Hearts),
        ];

        let pairs: Vec<_> = state.field_pairs().collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].defense, Some(card(Rank::Eight, Suit::Clubs)));
        assert_eq!(pairs[1].attack, card(Rank::Six, Suit::Hearts));
        assert_eq!(pairs[1].defense, None);
        assert_eq!(state.open_attacks(), 1);
    }

    #[test]
    fn test_empty_update() {
        assert!(GameStateUpdate::default().is_empty());
        let update: GameStateUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.is_empty());

        let mut state = mid_game();
        state.apply(update);
        assert_eq!(state, mid_game());
    }

    fn arb_card() -> impl Strategy<Value = Card> {
        (prop::sample::select(Rank::ALL.to_vec()), prop::sample::select(Suit::ALL.to_vec()))
            .prop_map(|(rank, suit)| Card::new(rank, suit))
    }

    fn arb_state() -> impl Strategy<Value = GameState> {
        (
            prop::collection::vec(arb_card(), 0..8),
            0u32..36,
            prop::collection::vec(arb_card(), 0..12),
            any::<bool>(),
            0u32..36,
            prop::option::of(arb_card()),
            any::<[bool; 4]>(),
        )
            .prop_map(|(hand, opp, field, turn, deck, trump, flags)| GameState {
                player_hand: hand,
                opponent_hand_count: opp,
                field_cards: field,
                is_my_turn: turn,
                deck_count: deck,
                discard_pile_count: 36 - deck,
                trump,
                room_id: None,
                waiting_for_peer: flags[0],
                is_ready: flags[1],
                opponent_ready: flags[2],
                game_started: flags[3],
            })
    }

    proptest! {
        #[test]
        fn prop_single_field_update_is_shallow(state in arb_state(), turn in any::<bool>()) {
            let mut merged = state.clone();
            merged.apply(GameStateUpdate { is_my_turn: Some(turn), ..Default::default() });

            prop_assert_eq!(merged.is_my_turn, turn);
            prop_assert_eq!(GameState { is_my_turn: state.is_my_turn, ..merged }, state);
        }

        #[test]
        fn prop_sequential_updates_compose(
            state in arb_state(),
            field in prop::collection::vec(arb_card(), 0..6),
        ) {
            let mut merged = state.clone();
            merged.apply(GameStateUpdate { field_cards: Some(field.clone()), ..Default::default() });
            merged.apply(GameStateUpdate { is_my_turn: Some(false), ..Default::default() });

            prop_assert_eq!(&merged.field_cards, &field);
            prop_assert!(!merged.is_my_turn);
            prop_assert_eq!(&merged.player_hand, &state.player_hand);
        }
    }
}
