//! Card Values
//!
//! Immutable playing cards as the relay sends them: a suit symbol and a
//! rank string. Game rules live on the relay, so nothing here compares or
//! orders cards.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// SUIT
// =============================================================================

/// One of the four French suits, serialized as its symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    /// ♠
    #[serde(rename = "♠")]
    Spades,
    /// ♥
    #[serde(rename = "♥")]
    Hearts,
    /// ♦
    #[serde(rename = "♦")]
    Diamonds,
    /// ♣
    #[serde(rename = "♣")]
    Clubs,
}

impl Suit {
    /// All suits.
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    /// Wire symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            Suit::Spades => "♠",
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
        }
    }

    /// Hearts and diamonds render red.
    pub const fn is_red(self) -> bool {
        matches!(self, Suit::Hearts | Suit::Diamonds)
    }
}

// =============================================================================
// RANK
// =============================================================================

/// One of the thirteen ranks, serialized as `"2"`..`"10"`, `"J"`, `"Q"`, `"K"`, `"A"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

impl Rank {
    /// All ranks, low to high.
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Wire string.
    pub const fn code(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }

    /// Face label shown on the table (Т, К, Д, В for the court cards).
    ///
    /// Display only; the wire always carries [`Rank::code`].
    pub const fn label(self) -> &'static str {
        match self {
            Rank::Ace => "Т",
            Rank::King => "К",
            Rank::Queen => "Д",
            Rank::Jack => "В",
            other => other.code(),
        }
    }
}

// =============================================================================
// CARD
// =============================================================================

/// A single card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Suit symbol.
    pub suit: Suit,
    /// Rank.
    pub rank: Rank,
}

impl Card {
    /// Create a card.
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.code(), self.suit.symbol())
    }
}
