//! Stack interpreter for compiled units
//!
//! A deliberately small execution core: one operand stack and one locals
//! array per frame, byte-offset relative jumps, recursive calls bounded by a
//! fixed depth. It exists so that equivalence of reconstructed objects can
//! be observed by *running* them, not by comparing structure.

use crate::class::{ClassObject, Instance};
use crate::error::RuntimeError;
use crate::object::{BoundMethod, CaptureCell, Function};
use crate::value::Value;
use ferry_bytecode::unit::flags;
use ferry_bytecode::{BytecodeReader, Constant, Opcode, Operand, OperandKind};
use std::sync::Arc;

/// Maximum interpreter call depth
const MAX_CALL_DEPTH: usize = 256;

/// Call any callable value: function, native, bound method, or class
/// (instantiation).
pub fn call_value(callee: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    call_value_at_depth(callee, args, 0)
}

/// Call a function object
pub fn call_function(func: &Arc<Function>, args: &[Value]) -> Result<Value, RuntimeError> {
    call_at_depth(func, args, 0)
}

fn call_value_at_depth(callee: &Value, args: &[Value], depth: usize) -> Result<Value, RuntimeError> {
    match callee {
        Value::Function(func) => call_at_depth(func, args, depth),
        Value::Native(native) => native.call(args),
        Value::BoundMethod(method) => {
            let mut bound_args = Vec::with_capacity(args.len() + 1);
            bound_args.push(method.receiver.clone());
            bound_args.extend_from_slice(args);
            call_at_depth(&method.func, &bound_args, depth)
        }
        Value::Class(class) => instantiate(class, args, depth),
        other => Err(RuntimeError::NotCallable(other.type_name())),
    }
}

/// Calling a class creates an instance; an `init` member, if present, runs
/// with the instance as its first argument.
fn instantiate(
    class: &Arc<ClassObject>,
    args: &[Value],
    depth: usize,
) -> Result<Value, RuntimeError> {
    let instance = Instance::new(class);
    if let Some(Value::Function(init)) = class.lookup("init") {
        let mut init_args = Vec::with_capacity(args.len() + 1);
        init_args.push(Value::Instance(Arc::clone(&instance)));
        init_args.extend_from_slice(args);
        call_at_depth(&init, &init_args, depth + 1)?;
    }
    Ok(Value::Instance(instance))
}

fn call_at_depth(func: &Arc<Function>, args: &[Value], depth: usize) -> Result<Value, RuntimeError> {
    if depth >= MAX_CALL_DEPTH {
        return Err(RuntimeError::RecursionLimit);
    }

    let unit = &func.unit;
    let mut locals = vec![Value::Null; unit.local_count.max(unit.param_count)];
    if unit.flags & flags::VARIADIC != 0 {
        let fixed = unit.param_count.saturating_sub(1);
        if args.len() < fixed {
            return Err(RuntimeError::ArityMismatch {
                expected: fixed,
                got: args.len(),
            });
        }
        locals[..fixed].clone_from_slice(&args[..fixed]);
        if unit.param_count > 0 {
            locals[fixed] = Value::list(args[fixed..].to_vec());
        }
    } else {
        if args.len() != unit.param_count {
            return Err(RuntimeError::ArityMismatch {
                expected: unit.param_count,
                got: args.len(),
            });
        }
        locals[..args.len()].clone_from_slice(args);
    }

    let cells = func.cells();
    let mut stack: Vec<Value> = Vec::new();
    let mut reader = BytecodeReader::new(&unit.code);

    macro_rules! pop {
        () => {
            stack
                .pop()
                .ok_or(RuntimeError::StackUnderflow(reader.position()))?
        };
    }

    loop {
        if reader.is_at_end() {
            return Ok(Value::Null);
        }
        let opcode = reader.read_opcode()?;
        let operand = read_operand(&mut reader, opcode)?;

        match opcode {
            Opcode::Nop => {}
            Opcode::Pop => {
                pop!();
            }
            Opcode::Dup => {
                let top = pop!();
                stack.push(top.clone());
                stack.push(top);
            }

            Opcode::ConstNull => stack.push(Value::Null),
            Opcode::ConstTrue => stack.push(Value::Bool(true)),
            Opcode::ConstFalse => stack.push(Value::Bool(false)),
            Opcode::ConstI32 => {
                let Operand::I32(value) = operand else {
                    unreachable!()
                };
                stack.push(Value::Int(value as i64));
            }
            Opcode::LoadConst => {
                let Operand::U32(index) = operand else {
                    unreachable!()
                };
                let constant = unit
                    .constant_at(index)
                    .ok_or(RuntimeError::ConstantOutOfRange(index))?;
                stack.push(constant_value(constant));
            }

            Opcode::LoadLocal => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let value = locals
                    .get(index as usize)
                    .cloned()
                    .ok_or(RuntimeError::LocalOutOfRange(index))?;
                stack.push(value);
            }
            Opcode::StoreLocal => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let value = pop!();
                let slot = locals
                    .get_mut(index as usize)
                    .ok_or(RuntimeError::LocalOutOfRange(index))?;
                *slot = value;
            }

            Opcode::Iadd | Opcode::Isub | Opcode::Imul | Opcode::Ieq | Opcode::Ilt => {
                let b = pop!();
                let a = pop!();
                stack.push(int_binop(opcode, &a, &b)?);
            }

            Opcode::Jmp => {
                let Operand::I32(offset) = operand else {
                    unreachable!()
                };
                jump(&mut reader, unit.code.len(), offset)?;
            }
            Opcode::JmpIfFalse => {
                let Operand::I32(offset) = operand else {
                    unreachable!()
                };
                let condition = pop!();
                let condition = condition.as_bool().ok_or(RuntimeError::TypeMismatch {
                    expected: "bool",
                    got: condition.type_name(),
                })?;
                if !condition {
                    jump(&mut reader, unit.code.len(), offset)?;
                }
            }

            Opcode::Call => {
                let Operand::U16(arg_count) = operand else {
                    unreachable!()
                };
                let split = stack
                    .len()
                    .checked_sub(arg_count as usize)
                    .ok_or(RuntimeError::StackUnderflow(reader.position()))?;
                let call_args: Vec<Value> = stack.split_off(split);
                let callee = pop!();
                stack.push(call_value_at_depth(&callee, &call_args, depth + 1)?);
            }
            Opcode::Return => {
                return Ok(pop!());
            }

            Opcode::LoadAttr => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let name = unit
                    .name_at(index)
                    .ok_or(RuntimeError::NameOutOfRange(index))?;
                let receiver = pop!();
                stack.push(load_attr(&receiver, name)?);
            }
            Opcode::StoreAttr => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let name = unit
                    .name_at(index)
                    .ok_or(RuntimeError::NameOutOfRange(index))?
                    .to_string();
                let value = pop!();
                let receiver = pop!();
                store_attr(&receiver, &name, value)?;
            }

            Opcode::LoadGlobal => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let name = unit
                    .name_at(index)
                    .ok_or(RuntimeError::NameOutOfRange(index))?;
                let value = func
                    .globals
                    .get(name)
                    .ok_or_else(|| RuntimeError::UndefinedGlobal(name.to_string()))?;
                stack.push(value);
            }
            Opcode::StoreGlobal => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let name = unit
                    .name_at(index)
                    .ok_or(RuntimeError::NameOutOfRange(index))?;
                let value = pop!();
                func.globals.set(name, value);
            }
            Opcode::DeleteGlobal => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let name = unit
                    .name_at(index)
                    .ok_or(RuntimeError::NameOutOfRange(index))?;
                func.globals
                    .remove(name)
                    .ok_or_else(|| RuntimeError::UndefinedGlobal(name.to_string()))?;
            }

            Opcode::MakeClosure => {
                let Operand::U32U16(const_index, capture_count) = operand else {
                    unreachable!()
                };
                let constant = unit
                    .constant_at(const_index)
                    .ok_or(RuntimeError::ConstantOutOfRange(const_index))?;
                let Constant::Unit(nested) = constant else {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "unit constant",
                        got: "non-unit constant",
                    });
                };
                let mut captured: Vec<Arc<CaptureCell>> = Vec::with_capacity(capture_count as usize);
                for _ in 0..capture_count {
                    match pop!() {
                        Value::Cell(cell) => captured.push(cell),
                        other => {
                            return Err(RuntimeError::TypeMismatch {
                                expected: "cell",
                                got: other.type_name(),
                            })
                        }
                    }
                }
                captured.reverse();
                let closure = Function::new(
                    Arc::clone(nested),
                    Arc::clone(&func.globals),
                    func.module.clone(),
                );
                closure.set_cells(captured);
                stack.push(Value::Function(closure));
            }
            Opcode::LoadCaptured => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let cell = cells
                    .get(index as usize)
                    .ok_or(RuntimeError::CaptureOutOfRange(index))?;
                stack.push(cell.get().ok_or(RuntimeError::EmptyCell)?);
            }
            Opcode::StoreCaptured => {
                let Operand::U16(index) = operand else {
                    unreachable!()
                };
                let cell = cells
                    .get(index as usize)
                    .ok_or(RuntimeError::CaptureOutOfRange(index))?;
                cell.set(pop!());
            }
        }
    }
}

fn read_operand(reader: &mut BytecodeReader<'_>, opcode: Opcode) -> Result<Operand, RuntimeError> {
    Ok(match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::U16 => Operand::U16(reader.read_u16()?),
        OperandKind::U32 => Operand::U32(reader.read_u32()?),
        OperandKind::I32 => Operand::I32(reader.read_i32()?),
        OperandKind::U32U16 => {
            let index = reader.read_u32()?;
            let count = reader.read_u16()?;
            Operand::U32U16(index, count)
        }
    })
}

fn jump(reader: &mut BytecodeReader<'_>, code_len: usize, offset: i32) -> Result<(), RuntimeError> {
    let target = reader.position() as i64 + offset as i64;
    if target < 0 || target > code_len as i64 {
        return Err(RuntimeError::BadJumpTarget(target));
    }
    reader.seek(target as usize);
    Ok(())
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s),
        Constant::Unit(unit) => Value::Unit(Arc::clone(unit)),
    }
}

fn int_binop(opcode: Opcode, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (Some(a), Some(b)) = (a.as_int(), b.as_int()) else {
        return Err(RuntimeError::TypeMismatch {
            expected: "int",
            got: if a.as_int().is_none() {
                a.type_name()
            } else {
                b.type_name()
            },
        });
    };
    Ok(match opcode {
        Opcode::Iadd => Value::Int(a.wrapping_add(b)),
        Opcode::Isub => Value::Int(a.wrapping_sub(b)),
        Opcode::Imul => Value::Int(a.wrapping_mul(b)),
        Opcode::Ieq => Value::Bool(a == b),
        Opcode::Ilt => Value::Bool(a < b),
        _ => unreachable!(),
    })
}

/// Attribute lookup with method binding
///
/// Instance lookup that lands on a class-level function produces a bound
/// method; class and module lookup return the raw member.
pub fn load_attr(receiver: &Value, name: &str) -> Result<Value, RuntimeError> {
    let found = match receiver {
        Value::Instance(instance) => instance.get_field(name).or_else(|| {
            instance.class.lookup(name).map(|member| match member {
                Value::Function(func) => {
                    Value::BoundMethod(BoundMethod::new(receiver.clone(), name, func))
                }
                other => other,
            })
        }),
        Value::Class(class) => class.lookup(name),
        Value::Module(module) => module.get(name),
        Value::Function(func) => func.get_prop(name),
        _ => None,
    };
    found.ok_or_else(|| RuntimeError::UndefinedAttribute {
        type_name: receiver.type_name(),
        name: name.to_string(),
    })
}

fn store_attr(receiver: &Value, name: &str, value: Value) -> Result<(), RuntimeError> {
    match receiver {
        Value::Instance(instance) => instance.set_field(name, value),
        Value::Class(class) => class.set_member(name, value),
        Value::Module(module) => module.set(name, value),
        Value::Function(func) => func.set_prop(name, value),
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "attribute-bearing value",
                got: other.type_name(),
            })
        }
    }
    Ok(())
}
