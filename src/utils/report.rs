use serde::{Deserialize, Serialize};

/// Outcome of one testbench scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
  pub name: String,
  pub passed: bool,
  pub cycles: u64,
}

/// Print all test records and an overall verdict.
pub fn print_test_records(records: &[TestRecord], sim_time: u64) {
  println!("--- Test Records ---");
  for record in records {
    let verdict = if record.passed { "PASS" } else { "FAIL" };
    println!("[{}] {:<28} {:>8} cycles", verdict, record.name, record.cycles);
  }
  println!("--- End Records ---");

  let passed = records.iter().filter(|r| r.passed).count();
  let failed = records.len() - passed;
  println!("Tests passed: {}", passed);
  println!("Tests failed: {}", failed);
  println!("Total simulation time: {} ticks", sim_time);
  if failed == 0 && !records.is_empty() {
    println!("ALL TESTS PASSED!");
  }
}
