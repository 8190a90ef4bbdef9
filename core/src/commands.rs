//! Destructive-command classifier and shell-wrapper detector consulted by
//! the orchestrator's `exec` handling: deny-lists for shell-wrapped
//! invocation forms and destructive verbs run with no explicit target.

const SHELL_WRAPPER_PROGRAMS: &[&str] = &["bash", "sh", "zsh", "ksh", "dash", "cmd", "powershell", "pwsh"];
const SHELL_WRAPPER_FLAGS: &[&str] = &["-c", "/c", "-command", "-Command"];

/// True when `argv` is of the shape `<shell> <flag> <script>` that hands an
/// arbitrary string to a shell for interpretation (`bash -c ...`,
/// `cmd /c ...`, `powershell -command ...`).
pub fn is_shell_wrapped(argv: &[String]) -> bool {
    let Some(program) = argv.first() else {
        return false;
    };
    let program_name = program
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program.as_str());

    if !SHELL_WRAPPER_PROGRAMS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(program_name))
    {
        return false;
    }

    argv.iter()
        .skip(1)
        .any(|arg| SHELL_WRAPPER_FLAGS.iter().any(|f| f.eq_ignore_ascii_case(arg)))
}

const DESTRUCTIVE_VERBS: &[&str] = &[
    "rm", "rmdir", "del", "rd", "format", "mkfs", "dd", "shred", "wipe", "sdelete",
];

fn looks_like_target(arg: &str) -> bool {
    !arg.starts_with('-') && !arg.is_empty()
}

/// True when `argv`'s program is a destructive verb and no argument beyond
/// its flags looks like an explicit target (path, device, or `of=`/`if=`
/// style key for `dd`).
pub fn is_destructive_without_target(argv: &[String]) -> bool {
    let Some(program) = argv.first() else {
        return false;
    };
    let program_name = program
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program.as_str());

    if !DESTRUCTIVE_VERBS.iter().any(|v| v.eq_ignore_ascii_case(program_name)) {
        return false;
    }

    !argv.iter().skip(1).any(|arg| looks_like_target(arg))
}
