//! 牛牛牌型评估
//!
//! 五张牌先按特殊牌型（五小牛、炸弹、金花、同花、顺子）判定，
//! 再在 C(5,3)=10 个三张组合里找"牛"。

use crate::card::{Card, Rank};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 牌型 (CardType)
/// 变体从小到大排列，直接用派生的 `Ord` 比较
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum CardType {
    NoBull,       // 无牛
    Bull1,        // 牛一
    Bull2,        // 牛二
    Bull3,        // 牛三
    Bull4,        // 牛四
    Bull5,        // 牛五
    Bull6,        // 牛六
    Bull7,        // 牛七
    Bull8,        // 牛八
    Bull9,        // 牛九
    BullBomb,     // 牛牛，同花、顺子也归到这里
    FiveSmall,    // 五小牛
    Bomb,         // 炸弹 (四张相同)
    GoldenFlower, // 金花 (同花顺)
}

impl CardType {
    /// 1..=9 对应牛一到牛九
    fn from_bull(value: u32) -> CardType {
        match value {
            1 => CardType::Bull1,
            2 => CardType::Bull2,
            3 => CardType::Bull3,
            4 => CardType::Bull4,
            5 => CardType::Bull5,
            6 => CardType::Bull6,
            7 => CardType::Bull7,
            8 => CardType::Bull8,
            9 => CardType::Bull9,
            _ => CardType::BullBomb,
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            CardType::NoBull => "无牛",
            CardType::Bull1 => "牛一",
            CardType::Bull2 => "牛二",
            CardType::Bull3 => "牛三",
            CardType::Bull4 => "牛四",
            CardType::Bull5 => "牛五",
            CardType::Bull6 => "牛六",
            CardType::Bull7 => "牛七",
            CardType::Bull8 => "牛八",
            CardType::Bull9 => "牛九",
            CardType::BullBomb => "牛牛",
            CardType::FiveSmall => "五小牛",
            CardType::Bomb => "炸弹",
            CardType::GoldenFlower => "金花",
        })
    }
}

/// 一手牌的评估结果
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct HandValue {
    pub card_type: CardType,
    /// 牛一到牛九为 1..=9，凑出来的牛牛为 10，其它牌型为 0
    pub bull_value: u32,
}

impl HandValue {
    fn special(card_type: CardType) -> HandValue {
        HandValue { card_type, bull_value: 0 }
    }
}

/// 计算牛牛牌型和牛值
///
/// 不是 5 张牌时按无牛处理。结果与牌的输入顺序无关。
pub fn calculate_bull(cards: &[Card]) -> HandValue {
    if cards.len() != 5 {
        return HandValue::special(CardType::NoBull);
    }

    if let Some(card_type) = special_card_type(cards) {
        return HandValue::special(card_type);
    }

    for i in 0..3 {
        for j in (i + 1)..4 {
            for k in (j + 1)..5 {
                let triple = cards[i].value() + cards[j].value() + cards[k].value();
                if triple % 10 != 0 {
                    continue;
                }
                // 有牛，剩下两张的点数决定牛几
                let rest: u32 = cards
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| *idx != i && *idx != j && *idx != k)
                    .map(|(_, c)| c.value())
                    .sum();
                let bull = rest % 10;
                return if bull == 0 {
                    HandValue { card_type: CardType::BullBomb, bull_value: 10 }
                } else {
                    HandValue { card_type: CardType::from_bull(bull), bull_value: bull }
                };
            }
        }
    }

    HandValue::special(CardType::NoBull)
}

/// 特殊牌型，按优先级依次检查
fn special_card_type(cards: &[Card]) -> Option<CardType> {
    let sum: u32 = cards.iter().map(Card::value).sum();
    if sum <= 10 {
        return Some(CardType::FiveSmall);
    }

    let mut counts = [0u8; 14];
    for card in cards {
        counts[card.rank.number() as usize] += 1;
    }
    if counts.contains(&4) {
        return Some(CardType::Bomb);
    }

    match (is_flush(cards), is_straight(cards)) {
        (true, true) => Some(CardType::GoldenFlower),
        // 同花或顺子，简化为牛牛
        (true, false) | (false, true) => Some(CardType::BullBomb),
        (false, false) => None,
    }
}

fn is_flush(cards: &[Card]) -> bool {
    cards.windows(2).all(|w| w[0].suit == w[1].suit)
}

fn is_straight(cards: &[Card]) -> bool {
    let mut ranks: Vec<u8> = cards.iter().map(|c| c.rank.number()).collect();
    ranks.sort_unstable();

    ranks.windows(2).all(|w| w[1] == w[0] + 1)
        // A-2-3-4-5 已被上面覆盖，这里只需补上 10-J-Q-K-A
        || ranks == [Rank::Ace, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King].map(Rank::number)
}

/// 手牌中最大的单张：先比点数，点数相同比花色
fn max_card(cards: &[Card]) -> Option<Card> {
    cards
        .iter()
        .copied()
        .max_by_key(|c| (c.value(), c.suit.strength()))
}

/// 比较两手牌：牌型 → 牛值 → 最大单张点数 → 最大单张花色
pub fn compare_hands(hand1: &[Card], hand2: &[Card]) -> Ordering {
    let v1 = calculate_bull(hand1);
    let v2 = calculate_bull(hand2);

    v1.card_type
        .cmp(&v2.card_type)
        .then(v1.bull_value.cmp(&v2.bull_value))
        .then_with(|| {
            let key = |hand: &[Card]| max_card(hand).map(|c| (c.value(), c.suit.strength()));
            key(hand1).cmp(&key(hand2))
        })
}

// --- 单元测试 ---
