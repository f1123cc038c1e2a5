use std::time::Instant;

use prfix::config::Task;
use prfix::contexts::Outcome;

/// End-of-run summary printed to stdout.
pub struct RunSummary {
    task: Task,
    start_time: Instant,
}

impl RunSummary {
    pub fn start(task: Task) -> Self {
        Self {
            task,
            start_time: Instant::now(),
        }
    }

    pub fn finish(&self, outcome: &Outcome) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Summary:");
        println!("  Task:      {}", self.task);
        println!("  Outcome:   {}", outcome);
        println!("  Files:     {}", outcome.files_changed());
        if let Outcome::DryRun { planned } = outcome {
            for path in planned {
                println!("    would write {}", path);
            }
        }
        println!("  Duration:  {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}
