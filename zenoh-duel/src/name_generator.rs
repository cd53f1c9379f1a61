/// Human-readable peer names
use markov_namegen::{CharacterChainGenerator, RandomTextGenerator};

/// Seed names for the generator
const SEED_NAMES: &[&str] = &[
    "Ada", "Boris", "Clara", "Dmitri", "Elena", "Felix", "Greta", "Hugo",
    "Irina", "Jonas", "Katya", "Lorenz", "Mila", "Nikolai", "Olga", "Pavel",
    "Quinn", "Rosa", "Stefan", "Tamsin", "Ulrich", "Vera", "Wendel", "Xenia",
    "Yuri", "Zora", "Anton", "Berta", "Casimir", "Dora", "Emil", "Frieda",
];

const MAX_NAME_LEN: usize = 10;

fn name_generator() -> CharacterChainGenerator {
    CharacterChainGenerator::builder()
        .with_order(2)
        .with_prior(0.01)
        .train(SEED_NAMES.iter().copied())
        .build()
}

fn is_usable(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Generate a pronounceable name such as "Katrin" or "Dorav"
pub fn generate_random_name() -> String {
    let mut generator = name_generator();
    loop {
        let name = generator.generate_one();
        if is_usable(&name) {
            return name;
        }
    }
}

/// Generate a name with a numeric suffix, e.g. "Katrin_417"
pub fn generate_unique_name() -> String {
    let suffix: u16 = rand::random::<u16>() % 1000;
    format!("{}_{}", generate_random_name(), suffix)
}
