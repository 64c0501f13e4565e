//! The deploy catalog: every deploy script of the protocol, in execution order.
//!
//! Each script groups steps under one or more tags. Every step declares the
//! records it depends on (linked libraries and address arguments), which lets
//! ordering violations be caught before anything is sent.

use std::collections::HashSet;

use itertools::Itertools;

use crate::{
    constants::{IMPLEMENTATION_SUFFIX, INITIALIZER_METHOD, PROXY_SUFFIX},
    errors::ScriptError,
    types::{DeployArg, ExternalContract},
};

/// The initializer invoked when a proxy is constructed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Initializer {
    /// The implementation method to call
    pub method: &'static str,
    /// The method's arguments
    pub args: Vec<DeployArg>,
}

/// A single contract deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployStep {
    /// The contract name, which is both the artifact and the record name
    pub name: &'static str,
    /// Constructor arguments (of the implementation, for proxied contracts)
    pub args: Vec<DeployArg>,
    /// Libraries linked into the bytecode
    pub libraries: Vec<&'static str>,
    /// Set for contracts deployed behind an upgradeable proxy
    pub proxy: Option<Initializer>,
}

impl DeployStep {
    /// A contract deployed without constructor arguments
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
            libraries: Vec::new(),
            proxy: None,
        }
    }

    /// Set the constructor arguments
    pub fn with_args(mut self, args: impl IntoIterator<Item = DeployArg>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Set the linked libraries
    pub fn linked(mut self, libraries: impl IntoIterator<Item = &'static str>) -> Self {
        self.libraries = libraries.into_iter().collect();
        self
    }

    /// Deploy behind a proxy, calling `initialize(args)` on construction
    pub fn behind_proxy(mut self, args: impl IntoIterator<Item = DeployArg>) -> Self {
        self.proxy = Some(Initializer {
            method: INITIALIZER_METHOD,
            args: args.into_iter().collect(),
        });
        self
    }

    /// The records this step reads
    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> + '_ {
        let args = self
            .args
            .iter()
            .chain(self.proxy.iter().flat_map(|init| init.args.iter()))
            .filter_map(|arg| match arg {
                DeployArg::Deployment(name) => Some(*name),
                DeployArg::External(_) => None,
            });

        self.libraries.iter().copied().chain(args).unique()
    }

    /// The external addresses this step reads
    pub fn externals(&self) -> impl Iterator<Item = ExternalContract> + '_ {
        self.args
            .iter()
            .chain(self.proxy.iter().flat_map(|init| init.args.iter()))
            .filter_map(|arg| match arg {
                DeployArg::External(contract) => Some(*contract),
                DeployArg::Deployment(_) => None,
            })
    }

    /// The records this step writes
    pub fn produces(&self) -> Vec<String> {
        let mut names = vec![self.name.to_string()];
        if self.proxy.is_some() {
            names.push(implementation_record(self.name));
            names.push(proxy_record(self.name));
        }
        names
    }
}

/// The record holding a proxied contract's implementation
pub fn implementation_record(name: &str) -> String {
    format!("{}{}", name, IMPLEMENTATION_SUFFIX)
}

/// The record holding a proxied contract's proxy
pub fn proxy_record(name: &str) -> String {
    format!("{}{}", name, PROXY_SUFFIX)
}

/// A tagged, ordered group of steps
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployScript {
    /// The script identifier, ordering scripts within the catalog
    pub id: &'static str,
    /// The tags selecting this script
    pub tags: Vec<&'static str>,
    /// The steps, run top to bottom
    pub steps: Vec<DeployStep>,
}

impl DeployScript {
    /// Whether any of the script's tags is in `tags`
    pub fn matches(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|tag| tags.iter().any(|t| t == tag))
    }
}

/// The validated list of deploy scripts
#[derive(Clone, Debug)]
pub struct Catalog {
    /// The scripts, in execution order
    scripts: Vec<DeployScript>,
}

impl Catalog {
    /// Validate and wrap a list of scripts.
    ///
    /// Step names must be unique, and running every script in order must
    /// never read a record before it is written. The latter also rules out
    /// dependency cycles.
    pub fn new(scripts: Vec<DeployScript>) -> Result<Self, ScriptError> {
        let duplicates = scripts
            .iter()
            .flat_map(|script| script.steps.iter().flat_map(|step| step.produces()))
            .duplicates()
            .join(", ");
        if !duplicates.is_empty() {
            return Err(ScriptError::Config(format!(
                "duplicate deploy steps: {}",
                duplicates
            )));
        }

        let mut produced: HashSet<String> = HashSet::new();
        for step in scripts.iter().flat_map(|script| script.steps.iter()) {
            if let Some(dependency) = step.dependencies().find(|dep| !produced.contains(*dep)) {
                return Err(ScriptError::missing_dependency(step.name, dependency));
            }
            produced.extend(step.produces());
        }

        Ok(Self { scripts })
    }

    /// The PredyPool protocol's deploy scripts
    pub fn protocol() -> Result<Self, ScriptError> {
        Self::new(protocol_scripts())
    }

    /// The scripts, in execution order
    pub fn scripts(&self) -> &[DeployScript] {
        &self.scripts
    }

    /// Every tag in the catalog, in first-use order
    pub fn tags(&self) -> Vec<&'static str> {
        self.scripts
            .iter()
            .flat_map(|script| script.tags.iter().copied())
            .unique()
            .collect()
    }

    /// Every dependency edge `(step, dependency)`, in execution order
    pub fn dependency_graph(&self) -> Vec<(&'static str, &'static str)> {
        self.scripts
            .iter()
            .flat_map(|script| script.steps.iter())
            .flat_map(|step| step.dependencies().map(move |dep| (step.name, dep)))
            .collect()
    }
}

/// The arguments of a market's initializer
fn market_initializer() -> [DeployArg; 4] {
    [
        DeployArg::Deployment("PredyPool"),
        DeployArg::External(ExternalContract::Permit2),
        DeployArg::External(ExternalContract::Filler),
        DeployArg::Deployment("PredyPoolQuoter"),
    ]
}

/// The scripts deploying the pool, its libraries and the markets around it
fn protocol_scripts() -> Vec<DeployScript> {
    use DeployArg::{Deployment, External};
    use ExternalContract::{Permit2, Pyth, QuoterV2, SwapRouter, UniswapFactory};

    vec![
        DeployScript {
            id: "00_deploy_modules",
            tags: vec!["PredyPool"],
            steps: vec![
                DeployStep::new("AddPairLogic"),
                DeployStep::new("ReaderLogic"),
                DeployStep::new("Trade"),
                DeployStep::new("TradeLogic").linked(["Trade"]),
                DeployStep::new("LiquidationLogic").linked(["Trade"]),
                DeployStep::new("SupplyLogic"),
                DeployStep::new("ReallocationLogic"),
            ],
        },
        DeployScript {
            id: "01_deploy_predy",
            tags: vec!["PredyPool"],
            steps: vec![DeployStep::new("PredyPool")
                .linked([
                    "ReallocationLogic",
                    "LiquidationLogic",
                    "ReaderLogic",
                    "AddPairLogic",
                    "SupplyLogic",
                    "TradeLogic",
                ])
                .behind_proxy([External(UniswapFactory)])],
        },
        DeployScript {
            id: "02_deploy_settlements",
            tags: vec!["settlements"],
            steps: vec![DeployStep::new("UniswapSettlement")
                .with_args([External(SwapRouter), External(QuoterV2)])],
        },
        DeployScript {
            id: "03_deploy_quoter",
            tags: vec!["quoter"],
            steps: vec![DeployStep::new("PredyPoolQuoter").with_args([Deployment("PredyPool")])],
        },
        DeployScript {
            id: "04_deploy_perp_market",
            tags: vec!["perp"],
            steps: vec![
                DeployStep::new("PerpMarket").behind_proxy(market_initializer()),
                DeployStep::new("PerpMarketQuoter").with_args([Deployment("PerpMarket")]),
            ],
        },
        DeployScript {
            id: "06_deploy_validators",
            tags: vec!["validators"],
            steps: vec![
                DeployStep::new("DutchOrderValidator"),
                DeployStep::new("GeneralDutchOrderValidator"),
                DeployStep::new("LimitOrderValidator"),
            ],
        },
        DeployScript {
            id: "07_deploy_gamma_market",
            tags: vec!["gamma"],
            steps: vec![
                DeployStep::new("GammaTradeMarketL2").behind_proxy(market_initializer()),
                DeployStep::new("GammaTradeMarketQuoter")
                    .with_args([Deployment("GammaTradeMarketL2")]),
            ],
        },
        DeployScript {
            id: "08_deploy_spot_market",
            tags: vec!["spot"],
            steps: vec![
                DeployStep::new("SpotMarketL2").with_args([External(Permit2)]),
                DeployStep::new("SpotMarketQuoter").with_args([Deployment("SpotMarketL2")]),
            ],
        },
        DeployScript {
            id: "09_deploy_price_feed_factory",
            tags: vec!["price"],
            steps: vec![DeployStep::new("PriceFeedFactory").with_args([External(Pyth)])],
        },
    ]
}
