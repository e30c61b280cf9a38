use crate::{
    ids::{
        Address,
        ObjectId,
        ParseIdError,
    },
    snapshot::{
        Coord,
        Direction,
    },
};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MODULE: &str = "tile_game_core";
pub const CLOCK_OBJECT_ID: &str = "0x6";

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BuildError {
    #[error("invalid {what}: {source}")]
    InvalidHandle {
        what: &'static str,
        #[source]
        source: ParseIdError,
    },
    #[error("module name must not be empty")]
    EmptyModule,
}

/// A single argument to a Move call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallArg {
    Object(ObjectId),
    U8(u8),
    U64(u64),
    /// The coin produced by the transaction's `fee_split`.
    SplitCoin,
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Object(id) => write!(f, "@{id}"),
            CallArg::U8(v) => write!(f, "{v}u8"),
            CallArg::U64(v) => write!(f, "{v}u64"),
            CallArg::SplitCoin => f.write_str("<split coin>"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

/// Unsigned transaction: one Move call, optionally fed by an exact amount split
/// off the gas coin. Sender and gas budget are attached by the executor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionDescription {
    pub call: MoveCall,
    pub fee_split: Option<u64>,
    pub gas_budget: Option<u64>,
    pub sender: Option<Address>,
}

impl TransactionDescription {
    fn new(call: MoveCall) -> Self {
        Self {
            call,
            fee_split: None,
            gas_budget: None,
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: Address, gas_budget: u64) -> Self {
        self.sender = Some(sender);
        self.gas_budget = Some(gas_budget);
        self
    }

    pub fn function(&self) -> &str {
        &self.call.function
    }
}

/// Builds call descriptions against one deployed package. Construction is pure:
/// no I/O, and building twice yields equal, independent descriptions.
#[derive(Clone, Debug)]
pub struct TxBuilder {
    package: ObjectId,
    module: String,
    clock: ObjectId,
}

impl TxBuilder {
    pub fn new(package: &str, module: &str, clock: &str) -> Result<Self, BuildError> {
        if module.trim().is_empty() {
            return Err(BuildError::EmptyModule);
        }
        Ok(Self {
            package: package.parse().map_err(|source| BuildError::InvalidHandle {
                what: "package id",
                source,
            })?,
            module: module.trim().to_string(),
            clock: clock.parse().map_err(|source| BuildError::InvalidHandle {
                what: "clock object id",
                source,
            })?,
        })
    }

    pub fn package(&self) -> &ObjectId {
        &self.package
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    fn call(&self, function: &str, arguments: Vec<CallArg>) -> TransactionDescription {
        TransactionDescription::new(MoveCall {
            package: self.package.clone(),
            module: self.module.clone(),
            function: function.to_string(),
            arguments,
        })
    }

    fn with_coin(
        &self,
        function: &str,
        mut arguments: Vec<CallArg>,
        amount: Option<u64>,
        tail: Vec<CallArg>,
    ) -> TransactionDescription {
        if amount.is_some() {
            arguments.push(CallArg::SplitCoin);
        }
        arguments.extend(tail);
        let mut tx = self.call(function, arguments);
        tx.fee_split = amount;
        tx
    }

    pub fn create_game(&self, registry: &ObjectId) -> TransactionDescription {
        self.call("create_game", vec![CallArg::Object(registry.clone())])
    }

    pub fn join_game(&self, game: &ObjectId, fee: Option<u64>) -> TransactionDescription {
        self.with_coin(
            "join_game",
            vec![CallArg::Object(game.clone())],
            fee,
            Vec::new(),
        )
    }

    pub fn choose_start(&self, game: &ObjectId, at: Coord) -> TransactionDescription {
        self.call(
            "choose_start",
            vec![
                CallArg::Object(game.clone()),
                CallArg::U64(at.x),
                CallArg::U64(at.y),
            ],
        )
    }

    pub fn start_game(&self, game: &ObjectId, funding: Option<u64>) -> TransactionDescription {
        self.with_coin(
            "start_game",
            vec![CallArg::Object(game.clone())],
            funding,
            vec![CallArg::Object(self.clock.clone())],
        )
    }

    pub fn move_with_cap(
        &self,
        game: &ObjectId,
        cap: &ObjectId,
        direction: Direction,
    ) -> TransactionDescription {
        self.call(
            "move_with_cap",
            vec![
                CallArg::Object(game.clone()),
                CallArg::Object(cap.clone()),
                CallArg::U8(direction.code()),
                CallArg::Object(self.clock.clone()),
            ],
        )
    }

    pub fn force_timeout(&self, game: &ObjectId) -> TransactionDescription {
        self.call(
            "force_timeout_move",
            vec![
                CallArg::Object(game.clone()),
                CallArg::Object(self.clock.clone()),
            ],
        )
    }

    pub fn create_registry(&self) -> TransactionDescription {
        self.call("create_registry", Vec::new())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn builder() -> TxBuilder {
        TxBuilder::new("0xabc", DEFAULT_MODULE, CLOCK_OBJECT_ID).unwrap()
    }

    fn game() -> ObjectId {
        "0xaaa".parse().unwrap()
    }

    #[test]
    fn builders__are_idempotent() {
        let b = builder();
        let cap: ObjectId = "0xc4".parse().unwrap();

        assert_eq!(b.create_game(&game()), b.create_game(&game()));
        assert_eq!(b.join_game(&game(), Some(10)), b.join_game(&game(), Some(10)));
        assert_eq!(
            b.move_with_cap(&game(), &cap, Direction::Left),
            b.move_with_cap(&game(), &cap, Direction::Left)
        );
    }

    #[test]
    fn move_with_cap__encodes_direction_and_clock() {
        // given
        let cap: ObjectId = "0xc4".parse().unwrap();

        // when
        let tx = builder().move_with_cap(&game(), &cap, Direction::Down);

        // then
        assert_eq!(tx.call.function, "move_with_cap");
        assert_eq!(
            tx.call.arguments,
            vec![
                CallArg::Object(game()),
                CallArg::Object(cap),
                CallArg::U8(2),
                CallArg::Object("0x6".parse().unwrap()),
            ]
        );
        assert_eq!(tx.sender, None);
        assert_eq!(tx.gas_budget, None);
    }

    #[test]
    fn start_game__places_funding_before_clock() {
        let tx = builder().start_game(&game(), Some(500_000_000));

        assert_eq!(tx.fee_split, Some(500_000_000));
        assert_eq!(tx.call.arguments[1], CallArg::SplitCoin);
        assert_eq!(tx.call.arguments.len(), 3);
    }

    #[test]
    fn join_game__without_fee_has_no_split() {
        let tx = builder().join_game(&game(), None);

        assert_eq!(tx.fee_split, None);
        assert_eq!(tx.call.arguments, vec![CallArg::Object(game())]);
    }

    #[test]
    fn tx_builder__rejects_malformed_package() {
        assert!(matches!(
            TxBuilder::new("", DEFAULT_MODULE, CLOCK_OBJECT_ID),
            Err(BuildError::InvalidHandle { .. })
        ));
        assert_eq!(
            TxBuilder::new("0x1", " ", CLOCK_OBJECT_ID).unwrap_err(),
            BuildError::EmptyModule
        );
    }

    #[test]
    fn move_call__target_is_fully_qualified() {
        let tx = builder().create_registry();
        assert!(tx.call.target().ends_with("::tile_game_core::create_registry"));
    }
}
