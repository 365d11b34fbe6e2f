use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use prime_probe::HashTable;
use prime_probe::hash_table::Entry;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    /// Initial slot count; the table starts at the next prime.
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Number of insert/remove operations in the churn phase.
    #[arg(short = 'o', long = "operations", default_value_t = 100_000)]
    operations: usize,

    /// Keys are drawn from `0..key_space`.
    #[arg(short = 'k', long = "key_space", default_value_t = 2_000)]
    key_space: u64,

    /// Seed for the churn workload.
    #[arg(short = 's', long = "seed", default_value_t = 0x5eed)]
    seed: u64,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64> = HashTable::with_capacity(args.target_capacity);
    println!("Actual capacity: {}", table.capacity());

    let fill = args.key_space / 2;
    println!("Filling table with {fill} values...");
    for value in 0..fill {
        let hash = hash_u64(value);
        match table.try_entry(hash, |&v| v == value) {
            Ok(Entry::Vacant(entry)) => {
                entry.insert(value);
            }
            Ok(Entry::Occupied(_)) => panic!("Value already exists in table: {value}"),
            Err(err) => {
                eprintln!("insert of {value} failed: {err}");
                return;
            }
        }
    }

    table.debug_stats().print();

    println!(
        "Churning {} operations over {} keys (seed {:#x})...",
        args.operations, args.key_space, args.seed
    );
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut inserts = 0usize;
    let mut removes = 0usize;
    let mut compacting_hits = 0usize;
    for _ in 0..args.operations {
        let value = rng.random_range(0..args.key_space.max(1));
        let hash = hash_u64(value);
        match rng.random_range(0..3) {
            0 => {
                if table.remove(hash, |&v| v == value).is_some() {
                    removes += 1;
                }
            }
            1 => {
                if table.find_mut(hash, |&v| v == value).is_some() {
                    compacting_hits += 1;
                }
            }
            _ => {
                if let Entry::Vacant(entry) = table.entry(hash, |&v| v == value) {
                    entry.insert(value);
                    inserts += 1;
                }
            }
        }
    }

    println!("{inserts} inserts, {removes} removes, {compacting_hits} compacting lookups");
    table.probe_histogram().print();
    table.debug_stats().print();

    table.shrink_to_fit();
    println!("After shrink_to_fit:");
    table.debug_stats().print();
}
