use std::fmt::Debug;
use std::marker::{PhantomData, PhantomPinned};
use std::mem::transmute;
use std::pin::Pin;
use std::ptr::NonNull;
use std::rc::Rc;

use super::{Buffer, Unpackable, Unpacker};

////////////////////////////////////////////// Backing /////////////////////////////////////////////

pub trait Backing: Debug {
    fn as_bytes(&self) -> &[u8];
}

impl Backing for &[u8] {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl Backing for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl Backing for Rc<Vec<u8>> {
    fn as_bytes(&self) -> &[u8] {
        self.as_ref()
    }
}

impl Backing for Buffer {
    fn as_bytes(&self) -> &[u8] {
        Buffer::as_bytes(self)
    }
}

impl Backing for Rc<Buffer> {
    fn as_bytes(&self) -> &[u8] {
        Buffer::as_bytes(self.as_ref())
    }
}

///////////////////////////////////////// ZeroCopyUnpacker /////////////////////////////////////////

#[derive(Debug)]
pub struct ZeroCopyUnpacker<'a, B, E, V>
where
    B: Backing,
    V: Unpackable<'a, Error=E> + 'a,
{
    value: NonNull<V>,
    backing: B,
    _pinned: PhantomPinned,
    _data: PhantomData<&'a mut u8>,
}

impl<'a, B, E, V> ZeroCopyUnpacker<'a, B, E, V>
where
    B: Backing,
    V: Unpackable<'a, Error=E> + 'a,
{
    pub fn new(backing: B) -> Result<Pin<Box<Self>>, E> {
        let zcu = ZeroCopyUnpacker {
            value: NonNull::dangling(),
            backing,
            _pinned: PhantomPinned,
            _data: PhantomData,
        };
        let mut boxed = Box::pin(zcu);
        let buf: &[u8] = boxed.backing.as_bytes();
        let buf: &'a [u8] = unsafe { transmute(buf) };
        let mut up: Unpacker<'a> = Unpacker::new(buf);
        let value: V = up.unpack()?;
        unsafe {
            boxed.as_mut().get_unchecked_mut().value =
                NonNull::new(Box::into_raw(Box::new(value))).unwrap();
        }
        Ok(boxed)
    }

    pub fn wrapped_value(self: Pin<&Self>) -> &'a V {
        unsafe {
            &*self.get_ref().value.as_ptr()
        }
    }
}

impl<'a, B, E, V> Drop for ZeroCopyUnpacker<'a, B, E, V>
where
    B: Backing,
    V: Unpackable<'a, Error=E> + 'a,
{
    fn drop(&mut self) {
        unsafe {
            if self.value != NonNull::dangling() {
                drop(Box::from_raw(NonNull::as_ptr(self.value)));
            }
        }
        self.value = NonNull::dangling();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
