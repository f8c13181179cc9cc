use limitrun::SupervisorError;

fn main() {
    if let Err(err) = limitrun::cli::run() {
        eprintln!("limitrun: {:#}", err);
        let code = err
            .downcast_ref::<SupervisorError>()
            .map_or(1, SupervisorError::exit_code);
        std::process::exit(code);
    }
}
