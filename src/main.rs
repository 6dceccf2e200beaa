use {
  judger_sandbox::Driver,
  std::{io, process},
  tracing_subscriber::EnvFilter,
};

fn main() {
  // Stdout carries the response frame, so diagnostics go to stderr.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(io::stderr)
    .init();

  let code = Driver::new().run(&mut io::stdin().lock(), &mut io::stdout().lock());

  process::exit(code);
}
