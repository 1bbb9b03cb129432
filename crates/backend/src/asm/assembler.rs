use alloy_primitives::{Bytes, U256};
use eyre::{bail, eyre, Result, WrapErr};

use super::{instruction::is_label_name, AsmEnv, Instruction, Label, Opcode, Payload, ScopeId};

/// Parses assembler text into instructions.
///
/// Every instruction of one call shares a single fresh scope, so local labels (`:name`) of
/// separately assembled fragments never collide.
pub fn assemble(source: &str, env: &AsmEnv) -> Result<Vec<Instruction>> {
    let scope = ScopeId::fresh();
    let mut code = Vec::new();
    let mut pending: Option<(Label, usize)> = None;

    for (index, raw) in source.lines().enumerate() {
        let lineno = index + 1;
        let line = match raw.find("//") {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = tokens.first() else { continue };

        if first.starts_with(':') {
            let label =
                Label::parse(first).ok_or_else(|| eyre!("line {lineno}: bad label {first:?}"))?;
            if tokens.len() > 1 {
                bail!("line {lineno}: unexpected tokens after label {label}");
            }
            if let Some((previous, at)) = &pending {
                bail!("line {at}: label {previous} is followed by another label at line {lineno}");
            }
            pending = Some((label, lineno));
            continue;
        }

        let mut inst = parse_instruction(&tokens, env).wrap_err_with(|| format!("line {lineno}"))?;
        inst.scope = Some(scope);
        inst.label = pending.take().map(|(label, _)| label);
        code.push(inst);
    }

    if let Some((label, at)) = pending {
        bail!("line {at}: label {label} does not precede an instruction");
    }
    Ok(code)
}

fn parse_instruction(tokens: &[&str], env: &AsmEnv) -> Result<Instruction> {
    let mnemonic = tokens[0].to_ascii_uppercase();
    let opcode = Opcode::from_mnemonic(&mnemonic)
        .ok_or_else(|| eyre!("unknown EVM instruction {:?}", tokens[0]))?;

    let operand = match tokens {
        [_] => None,
        [_, operand] => Some(*operand),
        _ => bail!("{mnemonic} takes at most one operand"),
    };

    match (opcode, operand) {
        (Opcode::Data, Some(operand)) => Ok(Instruction::data(parse_data(operand)?)),
        (Opcode::Data, None) => bail!("DATA requires a hex operand"),
        (opcode, Some(operand)) if opcode.is_push() => {
            Ok(Instruction::new(opcode).with_payload(parse_operand(operand, env)?))
        }
        (opcode, None) if opcode.is_push() => bail!("{mnemonic} requires an operand"),
        (_, Some(operand)) => bail!("{mnemonic} does not take an operand, got {operand:?}"),
        (opcode, None) => Ok(Instruction::new(opcode)),
    }
}

fn parse_operand(operand: &str, env: &AsmEnv) -> Result<Payload> {
    if let Some(name) = operand.strip_prefix('$') {
        if name == "undefined" {
            bail!("operand ${name} is undefined");
        }
        return env.lookup(name);
    }
    if let Some(digits) = operand.strip_prefix("0x").or_else(|| operand.strip_prefix("0X")) {
        if !(2..=64).contains(&digits.len()) {
            bail!("hex literal {operand} must have between 2 and 64 digits");
        }
        return U256::from_str_radix(digits, 16)
            .map(Payload::Int)
            .map_err(|e| eyre!("bad hex literal {operand}: {e}"));
    }
    if operand.bytes().all(|b| b.is_ascii_digit()) {
        return U256::from_str_radix(operand, 10)
            .map(Payload::Int)
            .map_err(|e| eyre!("bad decimal literal {operand}: {e}"));
    }
    if operand.starts_with(':') {
        return Label::parse(operand)
            .map(Payload::Label)
            .ok_or_else(|| eyre!("bad label reference {operand:?}"));
    }
    if is_label_name(operand) {
        return Ok(Payload::Label(Label::local(operand)));
    }
    bail!("unrecognized operand {operand:?}")
}

fn parse_data(operand: &str) -> Result<Bytes> {
    let digits = operand
        .strip_prefix("0x")
        .ok_or_else(|| eyre!("DATA operand must be a 0x-prefixed hex string"))?;
    Ok(hex::decode(digits).map_err(|e| eyre!("bad DATA operand {operand}: {e}"))?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{EnvKey, EnvValue};
    use alloy_primitives::address;

    #[test]
    fn test_assemble_basic() {
        let code = assemble(
            "
            // comment only
            PUSH1 0x01   // trailing comment
            push1 2
            add
            :done
            JUMPDEST
            STOP
            ",
            &AsmEnv::default(),
        )
        .unwrap();

        assert_eq!(code.len(), 5);
        assert_eq!(code[0].payload, Some(Payload::Int(U256::from(1))));
        assert_eq!(code[1].opcode, Opcode::Push1);
        assert_eq!(code[2].opcode, Opcode::Add);
        assert_eq!(code[3].label, Some(Label::local("done")));
        assert!(code.iter().all(|inst| inst.scope == code[0].scope && inst.scope.is_some()));
    }

    #[test]
    fn test_assemble_label_operands() {
        let code = assemble("PUSH3 ::runtime\nPUSH3 :skip\nPUSH3 skip\n", &AsmEnv::default())
            .unwrap();
        assert_eq!(code[0].payload, Some(Payload::Label(Label::global("runtime"))));
        assert_eq!(code[1].payload, Some(Payload::Label(Label::local("skip"))));
        assert_eq!(code[2].payload, Some(Payload::Label(Label::local("skip"))));
    }

    #[test]
    fn test_assemble_env_substitution() {
        let env = AsmEnv::with_defaults()
            .bind(
                EnvKey::HooksContractAddress,
                EnvValue::Address(address!("9000000000000000000000000000000000000002")),
            )
            .unwrap();
        let code =
            assemble("PUSH2 $SCRATCH_MEM_LOC\nPUSH20 $HOOKS_CONTRACT_ADDRESS\n", &env).unwrap();
        assert_eq!(code[0].payload, Some(Payload::Int(U256::from(0x8000))));
        assert!(matches!(&code[1].payload, Some(Payload::Bytes(b)) if b.len() == 20));

        assert!(assemble("PUSH4 $HANDLE_SPY_LOG_SELECTOR", &env).is_err());
        assert!(assemble("PUSH4 $NO_SUCH_KEY", &env).is_err());
        assert!(assemble("PUSH4 $undefined", &env).is_err());
    }

    #[test]
    fn test_assemble_data() {
        let code = assemble("DATA 0xdeadbeef", &AsmEnv::default()).unwrap();
        assert_eq!(code[0].opcode, Opcode::Data);
        assert_eq!(code[0].size(), 4);
    }

    #[test]
    fn test_assemble_errors() {
        let env = AsmEnv::default();
        let err = assemble("FROB", &env).unwrap_err();
        assert!(format!("{err:#}").contains("unknown EVM instruction"));

        assert!(assemble("PUSH1", &env).is_err());
        assert!(assemble("ADD 1", &env).is_err());
        assert!(assemble(":a JUMPDEST", &env).is_err());
        assert!(assemble("STOP\n:dangling", &env).is_err());
        assert!(assemble(":a\n:b\nSTOP", &env).is_err());
        assert!(assemble("PUSH1 0x1", &env).is_err());
        assert!(assemble("PUSH1 0x1g", &env).is_err());
    }

    #[test]
    fn test_assemble_scopes_are_fresh() {
        let env = AsmEnv::default();
        let a = assemble("STOP", &env).unwrap();
        let b = assemble("STOP", &env).unwrap();
        assert_ne!(a[0].scope, b[0].scope);
    }
}
