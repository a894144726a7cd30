//! Canonical encoding of values.

use bytes::{BufMut, Bytes, BytesMut};
use cellar_format::tag;
use cellar_format::vlc::{write_vlc_count, write_vlc_long};

use crate::blob::BlobNode;
use crate::blob_map::BlobMapNode;
use crate::cell::Value;
use crate::refs::Ref;
use crate::trie::HashNode;
use crate::vector::VectorNode;

pub(crate) fn encode_value(value: &Value) -> Bytes {
    let mut out = BytesMut::with_capacity(64);
    match value {
        Value::Nil => out.put_u8(tag::NULL),
        Value::Bool(false) => out.put_u8(tag::FALSE),
        Value::Bool(true) => out.put_u8(tag::TRUE),
        Value::Integer(x) => {
            out.put_u8(tag::INTEGER);
            write_vlc_long(&mut out, *x);
        }
        Value::Double(x) => {
            out.put_u8(tag::DOUBLE);
            out.put_u64(x.to_bits());
        }
        Value::Char(c) => {
            out.put_u8(tag::CHAR);
            write_vlc_count(&mut out, u64::from(*c));
        }
        Value::Address(a) => {
            out.put_u8(tag::ADDRESS);
            write_vlc_count(&mut out, *a);
        }
        Value::Symbol(name) => write_name(&mut out, tag::SYMBOL, name),
        Value::Keyword(name) => write_name(&mut out, tag::KEYWORD, name),
        Value::Str(node) => write_blob(&mut out, tag::STRING, node),
        Value::Blob(node) => write_blob(&mut out, tag::BLOB, node),
        Value::Vector(node) => write_vector(&mut out, tag::VECTOR, node),
        Value::List(node) => write_vector(&mut out, tag::LIST, node),
        Value::Map(node) => write_hash_node(&mut out, tag::MAP, node, true),
        Value::Set(node) => write_hash_node(&mut out, tag::SET, node, false),
        Value::BlobMap(node) => write_blob_map(&mut out, node),
    }
    out.freeze()
}

/// Write a child inline if it is embedded, otherwise as a hash pointer.
pub(crate) fn write_ref(out: &mut BytesMut, r: &Ref) {
    match r.try_value().filter(|_| r.is_embedded()) {
        Some(cell) => out.put_slice(&cell.encoding()),
        None => {
            out.put_u8(tag::REF);
            out.put_slice(r.hash().as_bytes());
        }
    }
}

fn write_name(out: &mut BytesMut, tag: u8, name: &str) {
    out.put_u8(tag);
    out.put_u8(name.len() as u8);
    out.put_slice(name.as_bytes());
}

fn write_blob(out: &mut BytesMut, tag: u8, node: &BlobNode) {
    out.put_u8(tag);
    match node {
        BlobNode::Leaf(bytes) => {
            write_vlc_count(out, bytes.len() as u64);
            out.put_slice(bytes);
        }
        BlobNode::Tree { count, children } => {
            write_vlc_count(out, *count);
            children.iter().for_each(|c| write_ref(out, c));
        }
    }
}

fn write_vector(out: &mut BytesMut, tag: u8, node: &VectorNode) {
    out.put_u8(tag);
    match node {
        VectorNode::Leaf {
            count,
            items,
            prefix,
        } => {
            write_vlc_count(out, *count);
            items.iter().for_each(|r| write_ref(out, r));
            if let Some(prefix) = prefix {
                write_ref(out, prefix);
            }
        }
        VectorNode::Tree { count, children } => {
            write_vlc_count(out, *count);
            children.iter().for_each(|r| write_ref(out, r));
        }
    }
}

fn write_hash_node(out: &mut BytesMut, tag: u8, node: &HashNode, with_values: bool) {
    out.put_u8(tag);
    match node {
        HashNode::Leaf(entries) => {
            write_vlc_count(out, entries.len() as u64);
            for entry in entries {
                write_ref(out, &entry.key);
                if with_values {
                    write_ref(out, &entry.value);
                }
            }
        }
        HashNode::Tree {
            count,
            shift,
            mask,
            children,
        } => {
            write_vlc_count(out, *count);
            out.put_u8(*shift);
            out.put_u16(*mask);
            children.iter().for_each(|r| write_ref(out, r));
        }
    }
}

fn write_blob_map(out: &mut BytesMut, node: &BlobMapNode) {
    out.put_u8(tag::BLOB_MAP);
    write_vlc_count(out, node.count);
    let Some(key) = &node.key else {
        return;
    };
    write_vlc_count(out, node.depth as u64);
    write_vlc_count(out, node.prefix_len as u64);
    out.put_u8(u8::from(node.value.is_some()));
    write_ref(out, key);
    if let Some(value) = &node.value {
        write_ref(out, value);
    }
    out.put_u16(node.mask);
    node.children.iter().for_each(|r| write_ref(out, r));
}
