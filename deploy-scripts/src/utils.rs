//! Utilities for the deploy scripts.

use std::io::{self, Write};

use alloy::primitives::{Address, B256};

use crate::{
    constants::{NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT},
    errors::ScriptError,
};

/// Prompt the operator for a line of input
pub fn prompt_for_input(prompt: &str) -> io::Result<String> {
    print!("{}: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().to_string())
}

/// Ask the operator to confirm an action, anything but `y`/`yes` declines
pub fn prompt_for_confirmation(prompt: &str) -> Result<bool, ScriptError> {
    let answer = prompt_for_input(&format!("{} [y/N]", prompt))
        .map_err(|e| ScriptError::Config(e.to_string()))?;
    Ok(is_confirmation(&answer))
}

/// Whether an answer to a yes/no prompt is a yes
fn is_confirmation(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "y" | "yes")
}

/// Extract the address held in the low-order bytes of a storage slot
pub fn address_from_slot(slot: B256) -> Address {
    Address::from_slice(&slot[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..NUM_BYTES_STORAGE_SLOT])
}
