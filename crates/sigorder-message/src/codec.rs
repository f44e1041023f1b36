//! Order message codec (fixed-order little-endian encoding).
//!
//! Layout:
//!   discriminator [8]            sha256("sigorder:<kind>")[0..8]
//!   order_type u8, market_type u8, market_index u16, direction u8
//!   base_asset_amount u64, price u64, reduce_only u8, post_only u8
//!   trigger_price   Option<u64>
//!   auction         Option<(u8, i64, i64)>
//!   max_ts          Option<i64>
//!   taker           u16 sub-account id | [32] taker address (delegate)
//!   expiry_slot u64
//!   correlation_id [16]
//!   take_profit     Option<(u64, u64)>
//!   stop_loss       Option<(u64, u64)>
//!
//! `Option` is a one-byte tag (0 = none, 1 = some) followed by the value.
//! The discriminator selects between the direct and the delegate layout.

use sha2::{Digest, Sha256};
use sigorder_types::{CorrelationId, MarketType, Pubkey, Result, SigOrderError};

use crate::{
    AuctionParams, BracketOrder, Direction, OrderMessage, OrderParams, OrderType, TakerIdentity,
};

const DIRECT_KIND: &str = "sigorder:OrderMessage";
const DELEGATE_KIND: &str = "sigorder:DelegateOrderMessage";

/// First 8 bytes of sha256 over the kind name.
pub fn discriminator(kind: &str) -> [u8; 8] {
    let hash = Sha256::digest(kind.as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[0..8]);
    out
}

/// Encode an order message to its canonical bytes.
pub fn encode(msg: &OrderMessage) -> Vec<u8> {
    let mut w = Vec::with_capacity(128);
    let kind = match msg.taker {
        TakerIdentity::SubAccount(_) => DIRECT_KIND,
        TakerIdentity::Delegate(_) => DELEGATE_KIND,
    };
    w.extend_from_slice(&discriminator(kind));

    let p = &msg.params;
    w.push(order_type_tag(p.order_type));
    w.push(market_type_tag(p.market_type));
    w.extend_from_slice(&p.market_index.to_le_bytes());
    w.push(direction_tag(p.direction));
    w.extend_from_slice(&p.base_asset_amount.to_le_bytes());
    w.extend_from_slice(&p.price.to_le_bytes());
    w.push(p.reduce_only as u8);
    w.push(p.post_only as u8);

    put_option(&mut w, p.trigger_price, |w, v| w.extend_from_slice(&v.to_le_bytes()));
    put_option(&mut w, p.auction, |w, a| {
        w.push(a.duration_slots);
        w.extend_from_slice(&a.start_price.to_le_bytes());
        w.extend_from_slice(&a.end_price.to_le_bytes());
    });
    put_option(&mut w, p.max_ts, |w, v| w.extend_from_slice(&v.to_le_bytes()));

    match msg.taker {
        TakerIdentity::SubAccount(id) => w.extend_from_slice(&id.to_le_bytes()),
        TakerIdentity::Delegate(pk) => w.extend_from_slice(pk.as_bytes()),
    }
    w.extend_from_slice(&msg.expiry_slot.to_le_bytes());
    w.extend_from_slice(msg.correlation_id.as_bytes());

    put_option(&mut w, msg.take_profit, put_bracket);
    put_option(&mut w, msg.stop_loss, put_bracket);
    w
}

/// Decode canonical bytes back to an order message.
pub fn decode(data: &[u8]) -> Result<OrderMessage> {
    let mut r = Reader::new(data);

    let disc: [u8; 8] = r.array()?;
    let delegate = if disc == discriminator(DIRECT_KIND) {
        false
    } else if disc == discriminator(DELEGATE_KIND) {
        true
    } else {
        return Err(SigOrderError::Decode(format!(
            "unknown message discriminator {}",
            hex::encode(disc)
        )));
    };

    let order_type = order_type_from_tag(r.u8()?)?;
    let market_type = market_type_from_tag(r.u8()?)?;
    let market_index = u16::from_le_bytes(r.array()?);
    let direction = direction_from_tag(r.u8()?)?;
    let base_asset_amount = u64::from_le_bytes(r.array()?);
    let price = u64::from_le_bytes(r.array()?);
    let reduce_only = r.bool()?;
    let post_only = r.bool()?;
    let trigger_price = r.option(|r| Ok(u64::from_le_bytes(r.array()?)))?;
    let auction = r.option(|r| {
        Ok(AuctionParams {
            duration_slots: r.u8()?,
            start_price: i64::from_le_bytes(r.array()?),
            end_price: i64::from_le_bytes(r.array()?),
        })
    })?;
    let max_ts = r.option(|r| Ok(i64::from_le_bytes(r.array()?)))?;

    let taker = if delegate {
        TakerIdentity::Delegate(Pubkey::new(r.array()?))
    } else {
        TakerIdentity::SubAccount(u16::from_le_bytes(r.array()?))
    };
    let expiry_slot = u64::from_le_bytes(r.array()?);
    let correlation_id = CorrelationId::from_bytes(r.array()?);
    let take_profit = r.option(read_bracket)?;
    let stop_loss = r.option(read_bracket)?;

    if r.remaining() != 0 {
        return Err(SigOrderError::Decode(format!(
            "{} trailing bytes after order message",
            r.remaining()
        )));
    }

    Ok(OrderMessage {
        params: OrderParams {
            order_type,
            market_type,
            market_index,
            direction,
            base_asset_amount,
            price,
            reduce_only,
            post_only,
            trigger_price,
            auction,
            max_ts,
        },
        taker,
        expiry_slot,
        correlation_id,
        take_profit,
        stop_loss,
    })
}

/// Decode a hex string (with or without 0x prefix) to an order message.
pub fn decode_hex(hex_str: &str) -> Result<OrderMessage> {
    let bytes = sigorder_types::hex_to_bytes(hex_str)?;
    decode(&bytes)
}

fn put_option<T>(w: &mut Vec<u8>, value: Option<T>, put: impl FnOnce(&mut Vec<u8>, T)) {
    match value {
        Some(v) => {
            w.push(1);
            put(w, v);
        }
        None => w.push(0),
    }
}

fn put_bracket(w: &mut Vec<u8>, b: BracketOrder) {
    w.extend_from_slice(&b.base_asset_amount.to_le_bytes());
    w.extend_from_slice(&b.trigger_price.to_le_bytes());
}

fn read_bracket(r: &mut Reader<'_>) -> Result<BracketOrder> {
    Ok(BracketOrder {
        base_asset_amount: u64::from_le_bytes(r.array()?),
        trigger_price: u64::from_le_bytes(r.array()?),
    })
}

fn order_type_tag(t: OrderType) -> u8 {
    match t {
        OrderType::Market => 0,
        OrderType::Limit => 1,
        OrderType::TriggerMarket => 2,
        OrderType::TriggerLimit => 3,
        OrderType::Oracle => 4,
    }
}

fn order_type_from_tag(tag: u8) -> Result<OrderType> {
    Ok(match tag {
        0 => OrderType::Market,
        1 => OrderType::Limit,
        2 => OrderType::TriggerMarket,
        3 => OrderType::TriggerLimit,
        4 => OrderType::Oracle,
        other => return Err(SigOrderError::Decode(format!("invalid order type {}", other))),
    })
}

fn market_type_tag(t: MarketType) -> u8 {
    match t {
        MarketType::Perp => 0,
        MarketType::Spot => 1,
    }
}

fn market_type_from_tag(tag: u8) -> Result<MarketType> {
    match tag {
        0 => Ok(MarketType::Perp),
        1 => Ok(MarketType::Spot),
        other => Err(SigOrderError::Decode(format!("invalid market type {}", other))),
    }
}

fn direction_tag(d: Direction) -> u8 {
    match d {
        Direction::Long => 0,
        Direction::Short => 1,
    }
}

fn direction_from_tag(tag: u8) -> Result<Direction> {
    match tag {
        0 => Ok(Direction::Long),
        1 => Ok(Direction::Short),
        other => Err(SigOrderError::Decode(format!("invalid direction {}", other))),
    }
}

/// Bounds-checked cursor over a byte slice.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(SigOrderError::Decode(format!(
                "unexpected end of data at offset {}: need {} bytes, have {}",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SigOrderError::Decode(format!("invalid bool byte {}", other))),
        }
    }

    fn option<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        match self.u8()? {
            0 => Ok(None),
            1 => read(self).map(Some),
            other => Err(SigOrderError::Decode(format!("invalid option tag {}", other))),
        }
    }
}
