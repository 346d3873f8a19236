//! Quest Dialogue
//!
//! This example demonstrates a small conversation with a blacksmith that is
//! driven entirely by data: no node names its successor.
//!
//! Key concepts:
//! - Condition groups over named conditions
//! - Nodes writing data that decides which node becomes enterable next
//! - Declarative node definitions loaded from JSON
//! - Saving history to a slot and restoring it into a fresh resolver
//!
//! Run with: cargo run --example quest_dialogue

use dynamic_state_machine::builder::{NodeBuilder, NodeDefinition, ResolverBuilder};
use dynamic_state_machine::checkpoint::{load_slot, save_slot, MemorySlotStore, SlotFormat};
use dynamic_state_machine::core::{
    BoolField, DataAsset, FieldRef, NodeBehavior, NodeContext, NumberCompare, NumberComparison,
    Value,
};
use dynamic_state_machine::resolver::{Resolver, ResolverMode};
use stillwater::effect::Effect;
use tracing_subscriber::EnvFilter;

/// Speaks one line, optionally raises a quest flag, then ends.
struct Line {
    text: &'static str,
    raise: Option<&'static str>,
}

impl NodeBehavior for Line {
    fn on_begin(&mut self, _ctx: &mut NodeContext<'_>) -> bool {
        println!("  Blacksmith: {}", self.text);
        true
    }

    fn apply_begin(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(flag) = self.raise {
            if let Ok(quest) = ctx.write("quest") {
                quest.set(flag, Value::Bool(true));
            }
        }
    }
}

/// Digs for a few frames, then adds one ore to the inventory.
struct Dig {
    frames: u32,
    elapsed: u32,
}

impl NodeBehavior for Dig {
    fn init(&mut self, _ctx: &mut NodeContext<'_>) {
        self.elapsed = 0;
    }

    fn on_update(&mut self, _ctx: &mut NodeContext<'_>, _delta: f32) -> bool {
        self.elapsed += 1;
        self.elapsed >= self.frames
    }

    fn on_end(&mut self, _ctx: &mut NodeContext<'_>) {
        println!("  [Mine] Found a piece of ore after {} frames", self.elapsed);
    }

    fn apply_end(&mut self, ctx: &mut NodeContext<'_>) {
        if let Ok(inventory) = ctx.write("inventory") {
            let ore = match inventory.get("ore") {
                Some(Value::Int(ore)) => *ore,
                _ => 0,
            };
            inventory.set("ore", Value::Int(ore + 1));
        }
    }
}

const GREETING: &str = r#"{
    "owner": "blacksmith",
    "name": "greet",
    "tags": ["intro"],
    "writable": { "quest": "ore_quest" },
    "conditions": {
        "greeted": { "type": "bool", "field": { "key": "quest", "path": [{ "field": "greeted" }] } }
    },
    "groups": { "enter": "!greeted" }
}"#;

fn build_resolver() -> Resolver {
    let greet = NodeDefinition::from_json(GREETING)
        .unwrap()
        .into_builder()
        .behavior(Line {
            text: "Welcome, traveller!",
            raise: Some("greeted"),
        })
        .build()
        .unwrap();

    let offer = NodeBuilder::new("blacksmith", "offer")
        .writable("quest", "ore_quest")
        .condition("greeted", BoolField::new("quest", ["greeted"]))
        .condition("accepted", BoolField::new("quest", ["accepted"]))
        .group("enter", "greeted && !accepted")
        .behavior(Line {
            text: "Bring me three pieces of ore and I'll forge you a blade.",
            raise: Some("accepted"),
        })
        .build()
        .unwrap();

    let enough_ore = || {
        NumberCompare::new(
            FieldRef::new("inventory", ["ore"]),
            NumberComparison::GreaterOrEqual,
            FieldRef::new("quest", ["required"]),
        )
    };

    let dig = NodeBuilder::new("mine", "dig")
        .read_only("quest", "ore_quest")
        .writable("inventory", "inventory")
        .condition("accepted", BoolField::new("quest", ["accepted"]))
        .condition("enoughOre", enough_ore())
        .group("enter", "accepted && !enoughOre")
        .behavior(Dig {
            frames: 2,
            elapsed: 0,
        })
        .build()
        .unwrap();

    let reward = NodeBuilder::new("blacksmith", "reward")
        .writable("quest", "ore_quest")
        .read_only("inventory", "inventory")
        .condition("enoughOre", enough_ore())
        .condition("done", BoolField::new("quest", ["done"]))
        .group("enter", "enoughOre && !done")
        .behavior(Line {
            text: "Fine ore! Here is your blade.",
            raise: Some("done"),
        })
        .build()
        .unwrap();

    ResolverBuilder::new()
        .asset(
            DataAsset::new("ore_quest", "Quest")
                .with("greeted", Value::Bool(false))
                .with("accepted", Value::Bool(false))
                .with("done", Value::Bool(false))
                .with("required", Value::Int(3)),
        )
        .asset(DataAsset::new("inventory", "Inventory").with("ore", Value::Int(0)))
        .node(greet)
        .node(offer)
        .node(dig)
        .node(reward)
        .transition_on_start(true)
        .build()
        .unwrap()
}

fn run(resolver: &mut Resolver, max_frames: u32) {
    for frame in 0..max_frames {
        if resolver.mode() == ResolverMode::Idle {
            println!("  (idle after {} frames)", frame);
            return;
        }
        if let Err(err) = resolver.tick(1.0 / 60.0) {
            println!("  Resolution aborted: {}", err);
            return;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Quest Dialogue ===\n");

    let mut resolver = build_resolver();
    resolver.start().unwrap();

    println!("Run 1: accept the quest and start digging");
    println!("----------------------------------------");
    run(&mut resolver, 4);
    resolver.stop();

    let path: Vec<String> = resolver
        .history()
        .path()
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!("\nHistory: {:?}", path);

    let store = MemorySlotStore::new();
    let last = resolver.history().len() - 1;
    let checkpoint = resolver.checkpoint("village", last, false).unwrap();
    let receipt = save_slot::<MemorySlotStore>(checkpoint, SlotFormat::Json)
        .run(&store)
        .await
        .unwrap();
    println!(
        "[Checkpoint] Saved {} entries ({} bytes) to '{}'\n",
        receipt.entries, receipt.bytes, receipt.slot
    );

    println!("Run 2: resume from the slot and finish the quest");
    println!("----------------------------------------");
    let loaded = load_slot::<MemorySlotStore>("village", true)
        .run(&store)
        .await
        .unwrap();
    let mut resumed = build_resolver();
    resumed.restore(&loaded).unwrap();
    resumed.request_transition().unwrap();
    run(&mut resumed, 60);

    let ore = resumed
        .latest_data("inventory")
        .and_then(|inventory| inventory.get("ore").cloned());
    println!("\nOre in inventory: {:?}", ore);
    println!("Nodes visited: {}", resumed.history().len());

    println!("\nKey Takeaways:");
    println!("- Nodes become enterable through data, not hard-wired transitions");
    println!("- Exactly one enterable node keeps the default policy unambiguous");
    println!("- Restoring replays history so a resumed machine continues seamlessly");

    println!("\n=== Example Complete ===");
}
